//! Segment identity: one append-only partition per (event kind, UTC day)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::EventKind;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Key of a day partition, e.g. `click/2026-10-19`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub kind: EventKind,
    pub day: NaiveDate,
}

impl SegmentKey {
    pub fn new(kind: EventKind, day: NaiveDate) -> Self {
        Self { kind, day }
    }

    /// Storage name of the segment.
    pub fn name(&self) -> String {
        format!("{}/{}", self.kind.as_str(), self.day.format(DAY_FORMAT))
    }

    /// Inverse of [`SegmentKey::name`]. `None` for anything that is not a segment.
    pub fn parse(name: &str) -> Option<Self> {
        let (kind, day) = name.split_once('/')?;
        let kind = kind.parse::<EventKind>().ok()?;
        let day = NaiveDate::parse_from_str(day, DAY_FORMAT).ok()?;
        Some(Self { kind, day })
    }
}

impl std::fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.day.format(DAY_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_name_round_trip() {
        let key = SegmentKey::new(EventKind::Return, NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());
        assert_eq!(key.name(), "return/2026-01-09");
        assert_eq!(SegmentKey::parse(&key.name()), Some(key));
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert_eq!(SegmentKey::parse("__sled__default"), None);
        assert_eq!(SegmentKey::parse("view/2026-01-09"), None);
        assert_eq!(SegmentKey::parse("click/yesterday"), None);
    }
}
