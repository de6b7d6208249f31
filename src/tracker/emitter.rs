//! Tracker → submitter message passing
//!
//! The tracker only ever calls [`EventEmitter::emit`], which uses `try_send`
//! and so never blocks or awaits. The [`Submitter`] task drains the channel and
//! performs the network submission. Anything that cannot be delivered lands
//! in the shared [`FallbackQueue`](super::FallbackQueue).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fallback::{self, SharedFallback};
use super::transport::{EventTransport, TransportError};
use crate::types::EventRecord;

// ============================================================================
// Emitter handle
// ============================================================================

/// Non-blocking sender half used by the tracker
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<EventRecord>,
    fallback: SharedFallback,
}

impl EventEmitter {
    /// Queue an event for submission, falling back locally if the channel is
    /// full or the submitter has gone away.
    pub fn emit(&self, record: EventRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                warn!(kind = %record.kind(), id = record.id(), "Submission channel full, using fallback queue");
                stash(&self.fallback, record);
            }
            Err(TrySendError::Closed(record)) => {
                warn!(
                    kind = %record.kind(),
                    id = record.id(),
                    error = %TransportError::ChannelClosed,
                    "Submitter unavailable, using fallback queue"
                );
                stash(&self.fallback, record);
            }
        }
    }

    pub fn fallback(&self) -> &SharedFallback {
        &self.fallback
    }
}

fn stash(queue: &SharedFallback, record: EventRecord) {
    fallback::lock(queue).push(record);
}

// ============================================================================
// Submitter task
// ============================================================================

/// Drains emitted events into an [`EventTransport`]
pub struct Submitter {
    rx: mpsc::Receiver<EventRecord>,
    transport: Arc<dyn EventTransport>,
    fallback: SharedFallback,
    retry_interval: Duration,
}

impl Submitter {
    /// Create the submitter and its emitter handle
    pub fn new(
        transport: Arc<dyn EventTransport>,
        fallback: SharedFallback,
        channel_capacity: usize,
        retry_interval: Duration,
    ) -> (Self, EventEmitter) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));

        let submitter = Self {
            rx,
            transport,
            fallback: fallback.clone(),
            retry_interval,
        };
        let emitter = EventEmitter { tx, fallback };

        (submitter, emitter)
    }

    /// Run until every emitter is dropped or `cancel` fires.
    ///
    /// Events still buffered at cancellation are moved to the fallback queue.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(transport = self.transport.name(), "Submitter starting");

        let mut retry_tick = tokio::time::interval(self.retry_interval);
        retry_tick.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.rx.close();
                    while let Some(record) = self.rx.recv().await {
                        stash(&self.fallback, record);
                    }
                    break;
                }
                maybe = self.rx.recv() => {
                    match maybe {
                        Some(record) => self.submit(record).await,
                        None => break,
                    }
                }
                _ = retry_tick.tick() => {
                    let has_pending = !fallback::lock(&self.fallback).is_empty();
                    if has_pending {
                        fallback::retry(&self.fallback, self.transport.as_ref()).await;
                    }
                }
            }
        }

        info!("Submitter stopped");
    }

    #[cfg(test)]
    pub(crate) fn into_receiver(self) -> mpsc::Receiver<EventRecord> {
        self.rx
    }

    async fn submit(&self, record: EventRecord) {
        match self.transport.send(&record).await {
            Ok(()) => debug!(kind = %record.kind(), id = record.id(), "Event submitted"),
            Err(e) => {
                warn!(
                    kind = %record.kind(),
                    id = record.id(),
                    error = %e,
                    "Event submission failed, using fallback queue"
                );
                stash(&self.fallback, record);
            }
        }
    }
}
