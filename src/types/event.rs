//! Outbound click / return domain events
//!
//! Both event types are immutable once recorded. Wire names are camelCase to
//! match what browsers send to the ingestion endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Fraction, Platform};

// ============================================================================
// Event kinds
// ============================================================================

/// Discriminator used for segment partitioning and the batch wire format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Return,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Click, EventKind::Return];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Return => "return",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(EventKind::Click),
            "return" => Ok(EventKind::Return),
            other => Err(other.to_string()),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// A visitor activated an outbound video link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    pub id: String,
    pub video_id: String,
    #[serde(default)]
    pub video_title: String,
    #[serde(default)]
    pub platform: Platform,
    pub click_time: DateTime<Utc>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub user_agent: String,
}

/// A visitor came back after following a [`ClickEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnEvent {
    pub id: String,
    pub click_id: String,
    pub return_time: DateTime<Utc>,
    pub time_spent_ms: u64,
    pub estimated_watch_percentage: Fraction,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ReturnEvent {
    /// Carries both a positive dwell and a positive estimate.
    pub fn is_complete(&self) -> bool {
        self.time_spent_ms > 0 && self.estimated_watch_percentage.get() > 0.0
    }
}

/// Validated event, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EventRecord {
    Click(ClickEvent),
    Return(ReturnEvent),
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            EventRecord::Click(_) => EventKind::Click,
            EventRecord::Return(_) => EventKind::Return,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EventRecord::Click(c) => &c.id,
            EventRecord::Return(r) => &r.id,
        }
    }
}
