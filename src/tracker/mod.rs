//! Interaction Tracker
//!
//! Detects outbound video clicks and the visitor's return, and turns the dwell
//! time in between into a watch-percentage estimate.
//!
//! ## Lifecycle of a click
//!
//! 1. `track_click` emits a ClickEvent and registers a pending tracker.
//! 2. The first pending tracker installs the shared visibility listener.
//! 3. On `Visible`, every pending tracker is resolved at once:
//!    - dwell < min: accidental tab switch, discarded silently
//!    - dwell > max: expired, no event
//!    - otherwise: a ReturnEvent with the estimated watch percentage
//! 4. When nothing is pending the listener is removed.
//!
//! No identifier survives the trip to the external site, so one return
//! resolves every eligible pending click. This is best-effort attribution.
//!
//! The tracker is single-threaded (`&mut self`) and its public methods never
//! fail or block: events are handed to an [`EventEmitter`] with `try_send`.
//!
//! ## Expiry contract
//!
//! The tracker owns no timer. Stale trackers are dropped whenever the host
//! calls `track_click`, `handle_visibility` or `poll_expiry`. A visitor who
//! never comes back leaves the listener installed until one of those runs,
//! so hosts should arm a timer for the instant `poll_expiry` returns and call
//! it again when the timer fires.

pub mod emitter;
pub mod estimator;
pub mod fallback;
pub mod host;
pub mod transport;

pub use emitter::{EventEmitter, Submitter};
pub use estimator::{estimate_watch_percentage, UserHistory};
pub use fallback::{FallbackQueue, RetryOutcome, SharedFallback};
pub use host::{
    DurationCatalog, RecordingHost, SessionInfo, StaticCatalog, VideoRef, Visibility,
    VisibilityHost,
};
pub use transport::{
    transport_for, EventTransport, HttpTransport, InProcessTransport, TransportError,
};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{CorrectionTable, TrackerConfig};
use crate::types::{ClickEvent, EventRecord, Fraction, NominalDuration, Platform, ReturnEvent};

/// A click waiting for the visitor to come back
#[derive(Debug, Clone)]
struct PendingClick {
    click_id: String,
    video_id: String,
    platform: Platform,
    nominal: NominalDuration,
    start_time: DateTime<Utc>,
}

/// What one visibility return did to the pending set
#[derive(Debug, Clone, Default)]
pub struct ResolveSummary {
    pub emitted: Vec<ReturnEvent>,
    pub discarded: usize,
    pub expired: usize,
}

/// Client-side click/return state machine
pub struct Tracker<H: VisibilityHost> {
    config: TrackerConfig,
    corrections: CorrectionTable,
    clock: Arc<dyn Clock>,
    emitter: EventEmitter,
    catalog: Option<Arc<dyn DurationCatalog>>,
    host: H,
    session: SessionInfo,
    history: UserHistory,
    pending: HashMap<String, PendingClick>,
    listener_installed: bool,
}

impl<H: VisibilityHost> Tracker<H> {
    pub fn new(
        host: H,
        emitter: EventEmitter,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
        corrections: CorrectionTable,
    ) -> Self {
        let history = UserHistory::new(config.user_history_capacity);
        Self {
            config,
            corrections,
            clock,
            emitter,
            catalog: None,
            host,
            session: SessionInfo::anonymous(),
            history,
            pending: HashMap::new(),
            listener_installed: false,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn DurationCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_session(mut self, session: SessionInfo) -> Self {
        self.session = session;
        self
    }

    /// Seed the visitor's prior completion rates.
    pub fn seed_history<I: IntoIterator<Item = Fraction>>(&mut self, rates: I) {
        self.history.seed(rates);
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn listener_installed(&self) -> bool {
        self.listener_installed
    }

    pub fn history(&self) -> &UserHistory {
        &self.history
    }

    /// Current user factor applied to new estimates
    pub fn user_factor(&self) -> f64 {
        self.history
            .factor(self.config.user_factor_min, self.config.user_factor_max)
    }

    /// Record an outbound click and start its dwell timer.
    pub fn track_click(&mut self, video: VideoRef, platform_hint: Option<Platform>) -> String {
        self.expire_stale();

        let platform = platform_hint
            .or(video.platform)
            .or_else(|| video.url.as_deref().map(Platform::detect))
            .unwrap_or_default();

        let catalog_duration = self
            .catalog
            .as_ref()
            .and_then(|c| c.duration_of(&video.id))
            .or(video.duration);
        let nominal = NominalDuration::resolve(catalog_duration, platform);

        let click_id = Uuid::new_v4().to_string();
        let now = self.clock.now();

        self.emitter.emit(EventRecord::Click(ClickEvent {
            id: click_id.clone(),
            video_id: video.id.clone(),
            video_title: video.title,
            platform,
            click_time: now,
            session_id: self.session.session_id.clone(),
            user_id: self.session.user_id.clone(),
            referrer: self.session.referrer.clone(),
            user_agent: self.session.user_agent.clone(),
        }));

        debug!(
            click_id = %click_id,
            video_id = %video.id,
            %platform,
            nominal_ms = nominal.as_millis_f64(),
            "Outbound click tracked"
        );

        self.pending.insert(
            click_id.clone(),
            PendingClick {
                click_id: click_id.clone(),
                video_id: video.id,
                platform,
                nominal,
                start_time: now,
            },
        );
        self.sync_listener();

        click_id
    }

    /// Handle a host visibility change.
    pub fn handle_visibility(&mut self, visibility: Visibility) -> ResolveSummary {
        let mut summary = ResolveSummary {
            expired: self.expire_stale(),
            ..Default::default()
        };
        if visibility == Visibility::Hidden {
            return summary;
        }

        let now = self.clock.now();
        let mut resolving: Vec<PendingClick> = self.pending.drain().map(|(_, p)| p).collect();
        resolving.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.click_id.cmp(&b.click_id)));

        for pending in resolving {
            let dwell_ms = dwell_ms(pending.start_time, now);

            if dwell_ms > self.config.max_dwell_ms {
                summary.expired += 1;
                debug!(click_id = %pending.click_id, dwell_ms, "Tracker expired on return");
            } else if dwell_ms < self.config.min_dwell_ms {
                summary.discarded += 1;
                debug!(click_id = %pending.click_id, dwell_ms, "Dwell below minimum, discarded");
            } else {
                let ret = self.build_return(&pending, dwell_ms, now);
                self.history.record(ret.estimated_watch_percentage);
                self.emitter.emit(EventRecord::Return(ret.clone()));
                summary.emitted.push(ret);
            }
        }

        self.sync_listener();

        if !summary.emitted.is_empty() {
            info!(
                emitted = summary.emitted.len(),
                discarded = summary.discarded,
                expired = summary.expired,
                "Visitor returned"
            );
        }
        summary
    }

    /// Drop trackers whose dwell already exceeds the maximum. Returns how many.
    pub fn expire_stale(&mut self) -> usize {
        let now = self.clock.now();
        let max = self.config.max_dwell_ms;
        let before = self.pending.len();
        self.pending.retain(|_, p| dwell_ms(p.start_time, now) <= max);

        let expired = before - self.pending.len();
        if expired > 0 {
            debug!(expired, "Stale trackers expired");
            self.sync_listener();
        }
        expired
    }

    /// Expire stale trackers and return when the host should call again.
    ///
    /// `None` means nothing is pending and the listener is already removed.
    pub fn poll_expiry(&mut self) -> Option<DateTime<Utc>> {
        self.expire_stale();
        self.next_expiry()
    }

    /// Instant the oldest pending tracker will expire, for host timers.
    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        let max = chrono::Duration::milliseconds(self.config.max_dwell_ms as i64);
        self.pending.values().map(|p| p.start_time + max).min()
    }

    fn build_return(&self, pending: &PendingClick, dwell_ms: u64, now: DateTime<Utc>) -> ReturnEvent {
        let platform_factor = self
            .corrections
            .factor(pending.platform, pending.nominal.bucket());
        let estimate = estimate_watch_percentage(
            dwell_ms,
            &pending.nominal,
            platform_factor,
            self.user_factor(),
        );

        debug!(
            click_id = %pending.click_id,
            video_id = %pending.video_id,
            dwell_ms,
            platform_factor,
            estimate = estimate.get(),
            "Return estimated"
        );

        ReturnEvent {
            id: Uuid::new_v4().to_string(),
            click_id: pending.click_id.clone(),
            return_time: now,
            time_spent_ms: dwell_ms,
            estimated_watch_percentage: estimate,
            session_id: self.session.session_id.clone(),
            user_id: self.session.user_id.clone(),
        }
    }

    fn sync_listener(&mut self) {
        if !self.pending.is_empty() && !self.listener_installed {
            self.host.install_listener();
            self.listener_installed = true;
        } else if self.pending.is_empty() && self.listener_installed {
            self.host.remove_listener();
            self.listener_installed = false;
        }
    }
}

fn dwell_ms(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - start).num_milliseconds().max(0) as u64
}
