//! Pipeline Regression Tests
//!
//! Drives the whole path from the interaction tracker through the submitter,
//! ingestion and the day-partitioned log into the aggregator, with a manual
//! clock so every run sees the same days.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use engagement_engine::clock::{Clock, ManualClock};
use engagement_engine::config::{AggregationConfig, CorrectionTable, TrackerConfig};
use engagement_engine::tracker::{
    fallback, EventTransport, FallbackQueue, InProcessTransport, RecordingHost, Submitter,
    TransportError, VideoRef,
};
use engagement_engine::types::{EstimateFilters, EventKind, EventRecord, Platform, StatsRange};
use engagement_engine::{Aggregator, IngestionService, LogStore, Tracker, Visibility};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 14, 9, 0, 0).unwrap()
}

fn click_entry(id: &str, video: &str, at: DateTime<Utc>) -> Value {
    json!({
        "type": "click",
        "data": {
            "id": id,
            "videoId": video,
            "videoUrl": "https://vimeo.com/123",
            "clickTime": at.to_rfc3339()
        }
    })
}

fn return_entry(click_id: &str, at: DateTime<Utc>, spent_ms: u64, estimate: f64) -> Value {
    json!({
        "type": "return",
        "data": {
            "clickId": click_id,
            "returnTime": at.to_rfc3339(),
            "timeSpentMs": spent_ms,
            "estimatedWatchPercentage": estimate
        }
    })
}

/// Transport that refuses everything, standing in for an unreachable collector.
struct Unreachable;

#[async_trait]
impl EventTransport for Unreachable {
    async fn send(&self, _record: &EventRecord) -> Result<(), TransportError> {
        Err(TransportError::Rejected("collector unreachable".to_string()))
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

/// Click, dwell and return flow through to a completion estimate.
#[tokio::test]
async fn test_tracker_to_estimate_end_to_end() {
    let clock = Arc::new(ManualClock::new(start()));
    let log = LogStore::in_memory();
    let ingest = IngestionService::new(log.clone(), clock.clone());
    let transport = Arc::new(InProcessTransport::new(ingest));
    let queue = FallbackQueue::shared(100);

    let (submitter, emitter) =
        Submitter::new(transport, queue.clone(), 64, Duration::from_secs(60));
    let task = tokio::spawn(submitter.run(CancellationToken::new()));

    let mut tracker = Tracker::new(
        RecordingHost::default(),
        emitter,
        clock.clone(),
        TrackerConfig::default(),
        CorrectionTable::default(),
    );

    let short = VideoRef::new("harbour")
        .title("Harbour walk")
        .url("https://www.youtube.com/shorts/abc")
        .duration(Duration::from_secs(60));
    tracker.track_click(short.clone(), None);
    clock.advance_ms(54_000);
    let summary = tracker.handle_visibility(Visibility::Visible);
    assert_eq!(summary.emitted.len(), 1);

    // Accidental tab switch, never reaches the log as a return
    tracker.track_click(short, None);
    clock.advance_ms(2_000);
    let summary = tracker.handle_visibility(Visibility::Visible);
    assert_eq!(summary.discarded, 1);

    drop(tracker);
    assert_ok!(task.await);
    assert!(queue.lock().unwrap().is_empty());

    let aggregator = Aggregator::new(log, clock, AggregationConfig::default());
    let report = aggregator.get_completion_estimates(StatsRange::Last7Days, &EstimateFilters::default());
    assert_eq!(report.estimates.len(), 1);

    let est = &report.estimates[0];
    assert_eq!(est.video_id, "harbour");
    assert_eq!(est.platform, Platform::ShortForm);
    assert_eq!(est.total_clicks, 2);
    assert_eq!(est.total_returns, 1);
    assert!((est.return_rate.get() - 50.0).abs() < 1e-9);
    assert!((est.average_watch_percentage.get() - 76.5).abs() < 1e-9);
    assert_eq!(report.orphaned_returns, 0);
}

/// Events emitted while the collector is down are retried from the fallback queue.
#[tokio::test]
async fn test_fallback_events_reach_the_log_after_recovery() {
    let clock = Arc::new(ManualClock::new(start()));
    let log = LogStore::in_memory();
    let queue = FallbackQueue::shared(100);

    let (submitter, emitter) =
        Submitter::new(Arc::new(Unreachable), queue.clone(), 64, Duration::from_secs(3600));
    let task = tokio::spawn(submitter.run(CancellationToken::new()));

    let mut tracker = Tracker::new(
        RecordingHost::default(),
        emitter,
        clock.clone(),
        TrackerConfig::default(),
        CorrectionTable::default(),
    );
    tracker.track_click(VideoRef::new("fjords").url("https://vimeo.com/9"), None);
    clock.advance_ms(120_000);
    tracker.handle_visibility(Visibility::Visible);
    drop(tracker);
    assert_ok!(task.await);

    {
        let q = queue.lock().unwrap();
        assert_eq!(q.len(EventKind::Click), 1);
        assert_eq!(q.len(EventKind::Return), 1);
    }

    let recovered = InProcessTransport::new(IngestionService::new(log.clone(), clock.clone()));
    let outcome = fallback::retry(&queue, &recovered).await;
    assert_eq!(outcome.sent, 2);
    assert_eq!(outcome.requeued, 0);

    let stats = Aggregator::new(log, clock, AggregationConfig::default())
        .get_external_video_stats(StatsRange::Last7Days);
    assert_eq!(stats.total_clicks, 1);
    assert_eq!(stats.total_returns, 1);
}

/// The log is append-only and never deduplicates.
#[test]
fn test_replayed_batch_doubles_totals() {
    let clock = Arc::new(ManualClock::new(start()));
    let log = LogStore::in_memory();
    let ingest = IngestionService::new(log.clone(), clock.clone());
    let t0 = start() - ChronoDuration::minutes(30);

    let batch = vec![
        click_entry("c1", "v1", t0),
        click_entry("c2", "v1", t0),
        return_entry("c1", t0 + ChronoDuration::minutes(5), 300_000, 0.9),
    ];

    let aggregator = Aggregator::new(log, clock, AggregationConfig::default());
    ingest.record_batch(batch.clone());
    let once = aggregator.get_external_video_stats(StatsRange::Last7Days);
    ingest.record_batch(batch);
    let twice = aggregator.get_external_video_stats(StatsRange::Last7Days);

    assert_eq!(once.total_clicks, 2);
    assert_eq!(twice.total_clicks, 4);
    assert_eq!(twice.total_returns, 2 * once.total_returns);
    assert_eq!(twice.return_rate, once.return_rate);
}

/// Only segments for days inside the window are read.
#[test]
fn test_window_covers_only_recent_days() {
    let today = start();
    let clock = Arc::new(ManualClock::new(today - ChronoDuration::days(9)));
    let log = LogStore::in_memory();
    let ingest = IngestionService::new(log.clone(), clock.clone());

    // Ingested 9, 5 and 2 days ago, then today
    for (n, days_ago) in [9i64, 5, 2, 0].into_iter().enumerate() {
        clock.set(today - ChronoDuration::days(days_ago));
        let results = ingest.record_batch(vec![click_entry(&format!("c{n}"), "v", clock.now())]);
        assert!(results[0].success);
    }

    assert_eq!(log.list_segments().len(), 4);

    let aggregator = Aggregator::new(log, clock, AggregationConfig::default());
    let week = aggregator.get_external_video_stats(StatsRange::Last7Days);
    assert_eq!(week.total_clicks, 3);
    assert_eq!(week.segments_scanned, 3);
    assert_eq!(week.return_rate.get(), 0.0);

    let month = aggregator.get_external_video_stats(StatsRange::Last30Days);
    assert_eq!(month.total_clicks, 4);
}

/// Reopen a sled log, waiting for the previous handle's background flusher
/// to release the file lock.
async fn reopen_sled(path: &std::path::Path) -> LogStore {
    let mut last_err = None;
    for _ in 0..50 {
        match LogStore::open_sled(path) {
            Ok(log) => return log,
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    panic!("sled lock never released: {last_err:?}");
}

/// Concurrent writers on the sled backend lose nothing, and the log survives a reopen.
#[tokio::test]
async fn test_sled_concurrent_ingestion_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.sled");
    let clock = Arc::new(ManualClock::new(start()));

    {
        let log = LogStore::open_sled(&db_path).unwrap();
        let ingest = IngestionService::new(log.clone(), clock.clone());

        let writers = (0..8).map(|w| {
            let ingest = ingest.clone();
            tokio::task::spawn_blocking(move || {
                let entries: Vec<Value> = (0..25)
                    .map(|i| click_entry(&format!("w{w}-c{i}"), &format!("video-{}", i % 3), start()))
                    .collect();
                ingest.record_batch(entries)
            })
        });

        for results in join_all(writers).await {
            let results = results.unwrap();
            assert_eq!(results.len(), 25);
            assert!(results.iter().all(|r| r.success));
        }
        assert_ok!(log.flush());
    }

    let log = reopen_sled(&db_path).await;
    assert_eq!(log.backend_name(), "sled");
    let stats = Aggregator::new(log, clock, AggregationConfig::default())
        .get_external_video_stats(StatsRange::Last7Days);
    assert_eq!(stats.total_clicks, 200);
    assert_eq!(stats.by_video.len(), 3);
    assert_eq!(stats.segments_scanned, 1);
}
