//! Symbolic aggregation windows

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Rolling window of calendar days ending today (inclusive).
///
/// Capped at 90 days; there is no way to request more.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum StatsRange {
    #[default]
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
}

impl StatsRange {
    pub fn days(&self) -> u64 {
        match self {
            StatsRange::Last7Days => 7,
            StatsRange::Last30Days => 30,
            StatsRange::Last90Days => 90,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatsRange::Last7Days => "7d",
            StatsRange::Last30Days => "30d",
            StatsRange::Last90Days => "90d",
        }
    }

    /// Calendar days covered by the window, newest first.
    pub fn calendar_days(&self, today: NaiveDate) -> Vec<NaiveDate> {
        (0..self.days())
            .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
            .collect()
    }
}

impl std::fmt::Display for StatsRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatsRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7d" => Ok(StatsRange::Last7Days),
            "30d" => Ok(StatsRange::Last30Days),
            "90d" => Ok(StatsRange::Last90Days),
            other => Err(format!("unsupported range '{other}' (expected 7d, 30d or 90d)")),
        }
    }
}
