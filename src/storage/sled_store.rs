//! Sled-backed segment store
//!
//! Each (event kind, day) segment is its own sled tree named after
//! [`SegmentKey::name`]; the database's tree list doubles as the segment index.
//! Records are keyed by `generate_id()` as big-endian bytes, so iteration
//! yields append order and every append is a single atomic insert rather than
//! a read-modify-write of the whole day.

use std::path::Path;
use std::sync::Arc;

use super::{SegmentKey, SegmentStore, StoreError};

/// Durable segment store on an embedded sled database
#[derive(Clone)]
pub struct SledSegmentStore {
    db: Arc<sled::Db>,
}

impl SledSegmentStore {
    /// Open or create the event log at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        tracing::info!(path = %path_ref.display(), "Event log opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Temporary database, removed on drop
    #[cfg(test)]
    pub(crate) fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    fn tree(&self, key: &SegmentKey) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(key.name())?)
    }
}

impl SegmentStore for SledSegmentStore {
    fn append(&self, key: &SegmentKey, record: &[u8]) -> Result<(), StoreError> {
        let tree = self.tree(key)?;
        let id = self.db.generate_id()?;
        tree.insert(id.to_be_bytes(), record)?;
        Ok(())
    }

    fn read_segment(&self, key: &SegmentKey) -> Result<Vec<Vec<u8>>, StoreError> {
        if !self.segment_exists(key) {
            return Err(StoreError::MissingSegment(*key));
        }

        let tree = self.tree(key)?;
        let mut records = Vec::with_capacity(tree.len());
        for item in tree.iter() {
            let (_id, value) = item?;
            records.push(value.to_vec());
        }
        Ok(records)
    }

    fn segment_exists(&self, key: &SegmentKey) -> bool {
        let name = key.name();
        self.db
            .tree_names()
            .iter()
            .any(|n| &n[..] == name.as_bytes())
    }

    fn list_segments(&self) -> Result<Vec<SegmentKey>, StoreError> {
        let mut keys: Vec<SegmentKey> = self
            .db
            .tree_names()
            .iter()
            .filter_map(|n| std::str::from_utf8(n).ok().and_then(SegmentKey::parse))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use chrono::NaiveDate;

    fn key(kind: EventKind, day: u32) -> SegmentKey {
        SegmentKey::new(kind, NaiveDate::from_ymd_opt(2026, 6, day).unwrap())
    }

    #[test]
    fn test_append_and_read_in_order() {
        let store = SledSegmentStore::temporary().unwrap();
        let k = key(EventKind::Click, 3);
        for i in 0..5 {
            store.append(&k, format!("r{i}").as_bytes()).unwrap();
        }
        let records = store.read_segment(&k).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0], b"r0");
        assert_eq!(records[4], b"r4");
    }

    #[test]
    fn test_missing_segment() {
        let store = SledSegmentStore::temporary().unwrap();
        let k = key(EventKind::Return, 4);
        assert!(!store.segment_exists(&k));
        assert!(matches!(store.read_segment(&k), Err(StoreError::MissingSegment(_))));
    }

    #[test]
    fn test_index_lists_only_segments() {
        let store = SledSegmentStore::temporary().unwrap();
        store.append(&key(EventKind::Return, 2), b"x").unwrap();
        store.append(&key(EventKind::Click, 1), b"y").unwrap();
        let segments = store.list_segments().unwrap();
        // sled's default tree is not a segment
        assert_eq!(
            segments,
            vec![key(EventKind::Click, 1), key(EventKind::Return, 2)]
        );
    }

    #[test]
    fn test_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("events.db");
        let k = key(EventKind::Click, 10);

        {
            let store = SledSegmentStore::open(&path).unwrap();
            store.append(&k, b"persisted").unwrap();
            store.flush().unwrap();
        }

        // sled's flusher thread can hold the file lock briefly after drop
        let mut reopened = SledSegmentStore::open(&path);
        for _ in 0..50 {
            if reopened.is_ok() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
            reopened = SledSegmentStore::open(&path);
        }
        let store = reopened.unwrap();
        assert_eq!(store.read_segment(&k).unwrap(), vec![b"persisted".to_vec()]);
    }

    #[test]
    fn test_concurrent_writers_same_segment() {
        let store = SledSegmentStore::temporary().unwrap();
        let k = key(EventKind::Click, 11);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        store.append(&k, format!("{t}:{i}").as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.read_segment(&k).unwrap().len(), 1_600);
    }
}
