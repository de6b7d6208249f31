//! Bounded local fallback for events that could not be submitted
//!
//! Keeps the most recent `capacity` records per event kind. When full, the
//! oldest record of that kind is evicted (FIFO). Records can be inspected or
//! retried later against any [`EventTransport`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::transport::EventTransport;
use crate::types::{EventKind, EventRecord};

/// Fallback queue shared between the tracker and its submitter task
pub type SharedFallback = Arc<Mutex<FallbackQueue>>;

/// Lock the queue, recovering it if a holder panicked.
///
/// Every mutation leaves the deques consistent, so a poisoned queue is still
/// safe to use and its records are worth keeping.
pub fn lock(queue: &SharedFallback) -> MutexGuard<'_, FallbackQueue> {
    queue.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("Fallback queue lock poisoned, recovering");
        poisoned.into_inner()
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    pub sent: usize,
    pub requeued: usize,
}

#[derive(Debug)]
pub struct FallbackQueue {
    capacity: usize,
    queues: HashMap<EventKind, VecDeque<EventRecord>>,
    evicted: u64,
}

impl FallbackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: HashMap::new(),
            evicted: 0,
        }
    }

    pub fn shared(capacity: usize) -> SharedFallback {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Store a record, returning the one evicted to make room, if any.
    pub fn push(&mut self, record: EventRecord) -> Option<EventRecord> {
        let kind = record.kind();
        let queue = self.queues.entry(kind).or_default();

        let evicted = if queue.len() >= self.capacity {
            self.evicted += 1;
            queue.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            debug!(%kind, id = old.id(), "Fallback queue full, evicted oldest record");
        }

        queue.push_back(record);
        evicted
    }

    /// Put records that failed a retry back ahead of anything queued since.
    ///
    /// `records` must be oldest first. Each kind is then trimmed from the
    /// front so only the newest `capacity` records remain.
    pub fn requeue_front(&mut self, records: Vec<EventRecord>) {
        for record in records.into_iter().rev() {
            self.queues.entry(record.kind()).or_default().push_front(record);
        }

        for (kind, queue) in &mut self.queues {
            while queue.len() > self.capacity {
                if let Some(old) = queue.pop_front() {
                    self.evicted += 1;
                    debug!(%kind, id = old.id(), "Fallback queue full, evicted oldest record");
                }
            }
        }
    }

    pub fn len(&self, kind: EventKind) -> usize {
        self.queues.get(&kind).map_or(0, VecDeque::len)
    }

    pub fn total_len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Records dropped by eviction since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Copy of the queued records of one kind, oldest first.
    pub fn snapshot(&self, kind: EventKind) -> Vec<EventRecord> {
        self.queues
            .get(&kind)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove and return every queued record, clicks before returns.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        let mut out = Vec::with_capacity(self.total_len());
        for kind in EventKind::ALL {
            if let Some(q) = self.queues.get_mut(&kind) {
                out.extend(q.drain(..));
            }
        }
        out
    }
}

/// Resend every queued record; failures go back on the queue.
///
/// The lock is never held across a send.
pub async fn retry(queue: &SharedFallback, transport: &dyn EventTransport) -> RetryOutcome {
    let pending = lock(queue).drain();

    if pending.is_empty() {
        return RetryOutcome::default();
    }

    let mut outcome = RetryOutcome::default();
    let mut failed = Vec::new();
    for record in pending {
        match transport.send(&record).await {
            Ok(()) => outcome.sent += 1,
            Err(e) => {
                debug!(id = record.id(), error = %e, "Retry failed");
                failed.push(record);
            }
        }
    }

    outcome.requeued = failed.len();
    if !failed.is_empty() {
        lock(queue).requeue_front(failed);
    }

    info!(
        transport = transport.name(),
        sent = outcome.sent,
        requeued = outcome.requeued,
        "Fallback retry finished"
    );
    outcome
}
