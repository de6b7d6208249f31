//! Event Ingestion
//!
//! Accepts click and return payloads (single or batched), validates them and
//! appends them to the day segment of the ingestion clock's current UTC date.
//! A bad entry in a batch never affects its siblings.

mod validation;

pub use validation::{parse_envelope, parse_record};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::storage::{LogStore, SegmentKey, StoreError};
use crate::types::{EventKind, EventRecord};

/// Ingestion failure for a single event
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown event type '{0}'")]
    UnknownType(String),

    #[error("malformed batch entry: {0}")]
    MalformedEnvelope(String),

    #[error("malformed {kind} event: {reason}")]
    Malformed { kind: EventKind, reason: String },

    #[error("failed to persist {kind} event: {source}")]
    Store {
        kind: EventKind,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    /// Whether the caller sent something wrong, as opposed to a storage fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, IngestError::Store { .. })
    }
}

/// Per-entry outcome of a batch, returned in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where an accepted event landed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub id: String,
    pub segment: SegmentKey,
}

/// Validates and persists incoming events
#[derive(Clone)]
pub struct IngestionService {
    log: LogStore,
    clock: Arc<dyn Clock>,
}

impl IngestionService {
    pub fn new(log: LogStore, clock: Arc<dyn Clock>) -> Self {
        Self { log, clock }
    }

    pub fn log(&self) -> &LogStore {
        &self.log
    }

    /// Validate and persist one raw payload of a known kind.
    pub fn record_event(&self, kind: EventKind, data: Value) -> Result<Accepted, IngestError> {
        let record = parse_record(kind, data, self.clock.now())?;
        self.record(&record)
    }

    /// Persist an already-typed record.
    pub fn record(&self, record: &EventRecord) -> Result<Accepted, IngestError> {
        let kind = record.kind();
        let day = self.clock.today();

        let segment = match record {
            EventRecord::Click(click) => self.log.append(kind, day, click),
            EventRecord::Return(ret) => self.log.append(kind, day, ret),
        }
        .map_err(|source| IngestError::Store { kind, source })?;

        debug!(%kind, id = record.id(), %segment, "Event recorded");
        Ok(Accepted {
            id: record.id().to_string(),
            segment,
        })
    }

    /// Process `{type, data}` entries independently, preserving order.
    pub fn record_batch(&self, entries: Vec<Value>) -> Vec<BatchResult> {
        let total = entries.len();
        let results: Vec<BatchResult> = entries
            .into_iter()
            .map(|entry| {
                let type_hint = entry
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();

                let outcome = parse_envelope(entry)
                    .and_then(|(kind, data)| self.record_event(kind, data));

                match outcome {
                    Ok(_) => BatchResult {
                        success: true,
                        event_type: type_hint,
                        error: None,
                    },
                    Err(e) => {
                        if e.is_client_error() {
                            debug!(event_type = %type_hint, error = %e, "Batch entry rejected");
                        } else {
                            warn!(event_type = %type_hint, error = %e, "Batch entry failed to persist");
                        }
                        BatchResult {
                            success: false,
                            event_type: type_hint,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();

        let accepted = results.iter().filter(|r| r.success).count();
        info!(total, accepted, rejected = total - accepted, "Batch ingested");
        results
    }
}
