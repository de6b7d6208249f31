//! Engagement Engine: external-video engagement estimation
//!
//! Videos embedded from third-party platforms never report playback. This
//! crate infers how much of a video a visitor watched from the moment they
//! clicked out and the moment they came back.
//!
//! ## Architecture
//!
//! - **Tracker**: client-side click/return state machine and watch estimator
//! - **Ingestion**: validates events and appends them to the day-partitioned log
//! - **Storage**: append-only `(kind, day)` segments on sled or in memory
//! - **Aggregation**: rates, confidence and data-quality labels over 7/30/90 days
//! - **API**: axum HTTP surface for ingestion and queries

pub mod aggregation;
pub mod api;
pub mod clock;
pub mod config;
pub mod ingest;
pub mod storage;
pub mod tracker;
pub mod types;

pub use aggregation::Aggregator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use ingest::{BatchResult, IngestError, IngestionService};
pub use storage::{LogStore, SegmentKey, StoreError};
pub use tracker::{Tracker, Visibility};

pub use types::{
    ClickEvent, CompletionEstimate, CompletionReport, Confidence, DataQuality, EstimateFilters,
    EventKind, EventRecord, ExternalVideoStats, Fraction, Percent, Platform, ReturnEvent,
    StatsRange,
};
