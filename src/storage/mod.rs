//! Event Log Storage
//!
//! Durable, append-only, day-partitioned storage for click and return events.
//! Every (event kind, UTC day) pair is a logical segment created lazily on its
//! first write and never rewritten afterwards.

mod segment;
mod sled_store;
mod log_store;
pub mod lockfile;
pub mod persistence;

pub use segment::SegmentKey;
pub use sled_store::SledSegmentStore;
pub use log_store::LogStore;
pub use lockfile::{LockError, ProcessLock};
pub use persistence::{InMemorySegmentStore, SegmentStore, StoreError};
