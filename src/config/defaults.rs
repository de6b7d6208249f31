//! System-wide default constants.
//!
//! Grouped by subsystem. Anything operator-tunable is mirrored as a field in
//! [`super::EngineConfig`] whose `Default` reads from here.

// ============================================================================
// Nominal durations
// ============================================================================

/// Fallback duration for short-form platforms (seconds).
pub const SHORT_FORM_DEFAULT_DURATION_SECS: u64 = 60;

/// Fallback duration for long-form platforms (seconds).
pub const LONG_FORM_DEFAULT_DURATION_SECS: u64 = 300;

/// Fallback duration for anything else (seconds).
pub const OTHER_DEFAULT_DURATION_SECS: u64 = 180;

/// Upper bound of the "short" duration bucket (seconds, inclusive).
pub const SHORT_BUCKET_MAX_SECS: u64 = 60;

/// Upper bound of the "medium" duration bucket (seconds, inclusive).
pub const MEDIUM_BUCKET_MAX_SECS: u64 = 600;

// ============================================================================
// Tracker
// ============================================================================

/// Dwell below this is an accidental tab switch (ms).
pub const MIN_DWELL_MS: u64 = 5_000;

/// Trackers older than this self-expire with no return (ms). 30 minutes.
pub const MAX_DWELL_MS: u64 = 1_800_000;

/// Records kept per event type in the local fallback queue.
pub const FALLBACK_QUEUE_CAPACITY: usize = 100;

/// Buffered events between the tracker and the submitter task.
pub const EMITTER_CHANNEL_CAPACITY: usize = 256;

/// Prior completion rates remembered per visitor.
pub const USER_HISTORY_CAPACITY: usize = 20;

/// Clamp applied to the visitor's mean completion rate.
pub const USER_FACTOR_MIN: f64 = 0.5;
pub const USER_FACTOR_MAX: f64 = 1.5;

/// HTTP timeout for the ingestion client (seconds).
pub const INGEST_HTTP_TIMEOUT_SECS: u64 = 10;

/// Interval between fallback-queue retries by the submitter (seconds).
pub const FALLBACK_RETRY_SECS: u64 = 30;

// ============================================================================
// Aggregation
// ============================================================================

/// A return at or above this watch fraction counts as a completion.
pub const COMPLETION_THRESHOLD: f64 = 0.90;

/// Sample sizes for the confidence label.
pub const HIGH_CONFIDENCE_MIN_SAMPLES: u64 = 50;
pub const MEDIUM_CONFIDENCE_MIN_SAMPLES: u64 = 20;

/// Completeness ratios for the data-quality label.
pub const HIGH_QUALITY_RATIO: f64 = 0.8;
pub const MEDIUM_QUALITY_RATIO: f64 = 0.5;

/// Entries in the "top videos by click volume" ranking.
pub const TOP_VIDEOS_LIMIT: usize = 10;

/// Confidence level of the completion-rate interval.
pub const INTERVAL_CONFIDENCE_LEVEL: f64 = 0.95;

// ============================================================================
// Server / storage
// ============================================================================

pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Maximum accepted request body (bytes). 1 MiB.
pub const REQUEST_BODY_LIMIT_BYTES: usize = 1024 * 1024;

pub const DATA_DIR: &str = "./data";

/// Sled database directory name inside the data directory.
pub const EVENT_DB_NAME: &str = "events.db";

/// Interval between background flushes of the event log (seconds).
pub const LOG_FLUSH_INTERVAL_SECS: u64 = 5;
