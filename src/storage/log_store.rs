//! Typed, day-partitioned event log over a [`SegmentStore`]
//!
//! Writers append encoded records to `(kind, day)` segments. Readers map a
//! symbolic range to the existing segments and merge their records. Read
//! paths never fail: missing days are empty, unreadable segments and
//! undecodable records are skipped with a warning.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{InMemorySegmentStore, SegmentKey, SegmentStore, SledSegmentStore, StoreError};
use crate::types::{EventKind, StatsRange};

#[derive(Clone)]
pub struct LogStore {
    backend: Arc<dyn SegmentStore>,
}

impl LogStore {
    pub fn new(backend: Arc<dyn SegmentStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySegmentStore::new()))
    }

    pub fn open_sled<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(SledSegmentStore::open(path)?)))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Append one record to the `(kind, day)` segment.
    pub fn append<T: Serialize>(
        &self,
        kind: EventKind,
        day: NaiveDate,
        record: &T,
    ) -> Result<SegmentKey, StoreError> {
        let key = SegmentKey::new(kind, day);
        let bytes = serde_json::to_vec(record)?;
        self.backend.append(&key, &bytes)?;
        debug!(segment = %key, size_bytes = bytes.len(), "Record appended");
        Ok(key)
    }

    /// Existing segments of `kind` among the `range.days()` most recent
    /// calendar days ending at `today`, newest first.
    pub fn segments_in_range(
        &self,
        range: StatsRange,
        kind: EventKind,
        today: NaiveDate,
    ) -> Vec<SegmentKey> {
        range
            .calendar_days(today)
            .into_iter()
            .map(|day| SegmentKey::new(kind, day))
            .filter(|key| self.backend.segment_exists(key))
            .collect()
    }

    /// Merge every record of the given segments into one list.
    pub fn load_records<T: DeserializeOwned>(&self, segments: &[SegmentKey]) -> Vec<T> {
        let mut records = Vec::new();

        for key in segments {
            let raw = match self.backend.read_segment(key) {
                Ok(raw) => raw,
                Err(StoreError::MissingSegment(_)) => {
                    debug!(segment = %key, "Segment absent, contributing zero records");
                    continue;
                }
                Err(e) => {
                    warn!(segment = %key, error = %e, "Skipping unreadable segment");
                    continue;
                }
            };

            let mut skipped = 0usize;
            for bytes in raw {
                match serde_json::from_slice::<T>(&bytes) {
                    Ok(record) => records.push(record),
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(segment = %key, skipped, "Skipped undecodable records");
            }
        }

        records
    }

    /// Every segment in the store.
    pub fn list_segments(&self) -> Vec<SegmentKey> {
        self.backend.list_segments().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list segments");
            Vec::new()
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }
}
