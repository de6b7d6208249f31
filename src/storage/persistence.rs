//! SegmentStore trait: pluggable append-only segment backend
//!
//! Abstracts the day-partitioned event log so backends can be swapped without
//! touching ingestion or aggregation:
//! - `SledSegmentStore`: embedded durable log (one sled tree per segment)
//! - `InMemorySegmentStore`: tests, the simulator and minimal deployments

use std::collections::BTreeMap;

use super::SegmentKey;

/// Trait for pluggable segment backends.
///
/// Implementations must be thread-safe (Send + Sync) and must make `append`
/// safe under concurrent writers to the same segment: no appended record may
/// be lost, whatever the interleaving.
pub trait SegmentStore: Send + Sync {
    /// Append one encoded record, creating the segment on first write.
    fn append(&self, key: &SegmentKey, record: &[u8]) -> Result<(), StoreError>;

    /// All records of a segment in append order.
    ///
    /// Returns [`StoreError::MissingSegment`] if the segment was never written.
    fn read_segment(&self, key: &SegmentKey) -> Result<Vec<Vec<u8>>, StoreError>;

    fn segment_exists(&self, key: &SegmentKey) -> bool;

    /// Index of every segment in the store.
    fn list_segments(&self) -> Result<Vec<SegmentKey>, StoreError>;

    /// Force buffered writes to durable storage.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Segment store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The requested day was never written. Readers treat this as zero records.
    #[error("segment {0} does not exist")]
    MissingSegment(SegmentKey),
    #[error("store lock poisoned: {0}")]
    Poisoned(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// In-memory segment store
///
/// Thread-safe via `RwLock`; appends are serialised by the write lock. Not
/// durable; data is lost on restart.
#[derive(Default)]
pub struct InMemorySegmentStore {
    segments: std::sync::RwLock<BTreeMap<SegmentKey, Vec<Vec<u8>>>>,
}

impl InMemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentStore for InMemorySegmentStore {
    fn append(&self, key: &SegmentKey, record: &[u8]) -> Result<(), StoreError> {
        let mut store = self
            .segments
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        store.entry(*key).or_default().push(record.to_vec());
        Ok(())
    }

    fn read_segment(&self, key: &SegmentKey) -> Result<Vec<Vec<u8>>, StoreError> {
        let store = self
            .segments
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        store
            .get(key)
            .cloned()
            .ok_or(StoreError::MissingSegment(*key))
    }

    fn segment_exists(&self, key: &SegmentKey) -> bool {
        self.segments
            .read()
            .map(|s| s.contains_key(key))
            .unwrap_or(false)
    }

    fn list_segments(&self) -> Result<Vec<SegmentKey>, StoreError> {
        let store = self
            .segments
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(store.keys().copied().collect())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn key(day: u32) -> SegmentKey {
        SegmentKey::new(EventKind::Click, NaiveDate::from_ymd_opt(2026, 4, day).unwrap())
    }

    #[test]
    fn test_lazy_segment_creation() {
        let store = InMemorySegmentStore::new();
        assert!(!store.segment_exists(&key(1)));
        assert!(matches!(
            store.read_segment(&key(1)),
            Err(StoreError::MissingSegment(_))
        ));

        store.append(&key(1), b"a").unwrap();
        store.append(&key(1), b"b").unwrap();
        assert!(store.segment_exists(&key(1)));
        assert_eq!(store.read_segment(&key(1)).unwrap(), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(store.list_segments().unwrap(), vec![key(1)]);
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let store = Arc::new(InMemorySegmentStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        store.append(&key(2), format!("{t}-{i}").as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.read_segment(&key(2)).unwrap().len(), 2_000);
    }
}
