//! Event transports: how a tracked event reaches ingestion
//!
//! - [`HttpTransport`] POSTs a one-element batch to a remote ingestion server.
//! - [`InProcessTransport`] calls an [`IngestionService`] directly.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::defaults;
use crate::ingest::{BatchResult, IngestionService};
use crate::types::EventRecord;

/// Event could not reach ingestion. Always recoverable via the fallback queue.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ingestion returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("ingestion rejected event: {0}")]
    Rejected(String),

    #[error("ingestion failed: {0}")]
    Ingest(String),

    #[error("submission channel closed")]
    ChannelClosed,
}

#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send(&self, record: &EventRecord) -> Result<(), TransportError>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

// ============================================================================
// HTTP
// ============================================================================

/// Sends events to `POST {base}/api/v1/events`
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::INGEST_HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/api/v1/events", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn send(&self, record: &EventRecord) -> Result<(), TransportError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&[record])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status()));
        }

        let results: Vec<BatchResult> = resp.json().await?;
        match results.into_iter().next() {
            Some(r) if r.success => Ok(()),
            Some(r) => Err(TransportError::Rejected(
                r.error.unwrap_or_else(|| "no reason given".to_string()),
            )),
            None => Err(TransportError::Rejected("empty batch response".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// ============================================================================
// In-process
// ============================================================================

/// Hands events straight to a local ingestion service
#[derive(Clone)]
pub struct InProcessTransport {
    ingest: IngestionService,
}

impl InProcessTransport {
    pub fn new(ingest: IngestionService) -> Self {
        Self { ingest }
    }
}

#[async_trait]
impl EventTransport for InProcessTransport {
    async fn send(&self, record: &EventRecord) -> Result<(), TransportError> {
        self.ingest
            .record(record)
            .map(|_| ())
            .map_err(|e| TransportError::Ingest(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

/// Pick the transport for a tracker: HTTP when an ingestion URL is
/// configured (`tracker.ingest_url`), otherwise the local service.
pub fn transport_for(
    ingest_url: Option<&str>,
    local: IngestionService,
) -> Result<Arc<dyn EventTransport>, TransportError> {
    match ingest_url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Ok(Arc::new(HttpTransport::new(url)?)),
        None => Ok(Arc::new(InProcessTransport::new(local))),
    }
}
