//! Aggregation & Completion-Rate Estimator
//!
//! Read-only projection over a rolling window of log segments. Each query
//! loads the click and return segments of its range, joins returns to clicks
//! by click id and groups the result by video and by platform. Nothing here
//! is cached or persisted; labels are recomputed on every call.
//!
//! Returns whose click is not in the window, or whose return time is not
//! strictly after the click, are counted as `orphanedReturns` and otherwise
//! ignored.

pub mod scoring;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::AggregationConfig;
use crate::storage::LogStore;
use crate::types::{
    ClickEvent, CompletionEstimate, CompletionReport, EstimateFilters, EventKind,
    ExternalVideoStats, Fraction, Platform, PlatformStats, ReturnEvent, StatsRange, VideoStats,
};
use scoring::{confidence, data_quality, safe_mean, safe_rate, wilson_interval};

// ============================================================================
// Tallies
// ============================================================================

/// Running counters for one grouping key.
#[derive(Debug, Clone, Default, PartialEq)]
struct Tally {
    clicks: u64,
    returns: u64,
    time_spent_ms: u64,
    completions: u64,
    complete_samples: u64,
    watch_sum: f64,
}

impl Tally {
    fn add_return(&mut self, ret: &ReturnEvent, threshold: f64) {
        let estimate = ret.estimated_watch_percentage.get();
        self.returns += 1;
        self.time_spent_ms = self.time_spent_ms.saturating_add(ret.time_spent_ms);
        self.watch_sum += estimate;
        if estimate >= threshold {
            self.completions += 1;
        }
        if ret.is_complete() {
            self.complete_samples += 1;
        }
    }

    fn merge(&mut self, other: &Tally) {
        self.clicks += other.clicks;
        self.returns += other.returns;
        self.time_spent_ms = self.time_spent_ms.saturating_add(other.time_spent_ms);
        self.completions += other.completions;
        self.complete_samples += other.complete_samples;
        self.watch_sum += other.watch_sum;
    }

    fn average_time_spent(&self) -> f64 {
        safe_mean(self.time_spent_ms as f64, self.returns)
    }

    fn average_watch(&self) -> Fraction {
        Fraction::clamped(safe_mean(self.watch_sum, self.returns))
    }
}

#[derive(Debug, Clone)]
struct VideoTally {
    video_id: String,
    video_title: String,
    platform: Platform,
    tally: Tally,
}

impl VideoTally {
    fn to_stats(&self) -> VideoStats {
        let t = &self.tally;
        VideoStats {
            video_id: self.video_id.clone(),
            video_title: self.video_title.clone(),
            platform: self.platform,
            total_clicks: t.clicks,
            total_returns: t.returns,
            return_rate: safe_rate(t.returns, t.clicks),
            total_time_spent: t.time_spent_ms,
            average_time_spent: t.average_time_spent(),
            estimated_completions: t.completions,
            estimated_completion_rate: safe_rate(t.completions, t.returns),
        }
    }
}

fn platform_stats(platform: Platform, t: &Tally) -> PlatformStats {
    PlatformStats {
        platform,
        total_clicks: t.clicks,
        total_returns: t.returns,
        return_rate: safe_rate(t.returns, t.clicks),
        total_time_spent: t.time_spent_ms,
        average_time_spent: t.average_time_spent(),
        estimated_completions: t.completions,
        estimated_completion_rate: safe_rate(t.completions, t.returns),
    }
}

/// Click/return records of one window, joined by click id.
struct JoinedWindow {
    /// Keyed by video id for deterministic output order
    videos: BTreeMap<String, VideoTally>,
    orphaned_returns: u64,
    segments_scanned: usize,
}

impl JoinedWindow {
    fn build(clicks: Vec<ClickEvent>, returns: Vec<ReturnEvent>, segments_scanned: usize, threshold: f64) -> Self {
        let mut videos: BTreeMap<String, VideoTally> = BTreeMap::new();
        let mut click_index: HashMap<String, (String, chrono::DateTime<chrono::Utc>)> =
            HashMap::with_capacity(clicks.len());

        for click in clicks {
            let entry = videos
                .entry(click.video_id.clone())
                .or_insert_with(|| VideoTally {
                    video_id: click.video_id.clone(),
                    video_title: String::new(),
                    platform: click.platform,
                    tally: Tally::default(),
                });
            // First non-empty title wins
            if entry.video_title.is_empty() && !click.video_title.is_empty() {
                entry.video_title = click.video_title.clone();
            }
            entry.tally.clicks += 1;
            click_index.insert(click.id, (click.video_id, click.click_time));
        }

        let mut orphaned_returns = 0u64;
        for ret in &returns {
            let target = click_index
                .get(&ret.click_id)
                .filter(|(_, click_time)| ret.return_time > *click_time)
                .and_then(|(video_id, _)| videos.get_mut(video_id));

            match target {
                Some(video) => video.tally.add_return(ret, threshold),
                None => {
                    orphaned_returns += 1;
                    debug!(return_id = %ret.id, click_id = %ret.click_id, "Orphaned return");
                }
            }
        }

        Self {
            videos,
            orphaned_returns,
            segments_scanned,
        }
    }

    fn platform_tallies<'a>(videos: impl Iterator<Item = &'a VideoTally>) -> BTreeMap<Platform, Tally> {
        let mut platforms: BTreeMap<Platform, Tally> = BTreeMap::new();
        for video in videos {
            platforms.entry(video.platform).or_default().merge(&video.tally);
        }
        platforms
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Stats and completion-estimate queries over the event log
#[derive(Clone)]
pub struct Aggregator {
    log: LogStore,
    clock: Arc<dyn Clock>,
    config: AggregationConfig,
}

impl Aggregator {
    pub fn new(log: LogStore, clock: Arc<dyn Clock>, config: AggregationConfig) -> Self {
        Self { log, clock, config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    fn load_window(&self, range: StatsRange) -> JoinedWindow {
        let today = self.clock.today();
        let click_segments = self.log.segments_in_range(range, EventKind::Click, today);
        let return_segments = self.log.segments_in_range(range, EventKind::Return, today);
        let segments_scanned = click_segments.len() + return_segments.len();

        let clicks: Vec<ClickEvent> = self.log.load_records(&click_segments);
        let returns: Vec<ReturnEvent> = self.log.load_records(&return_segments);
        debug!(
            %range,
            segments = segments_scanned,
            clicks = clicks.len(),
            returns = returns.len(),
            "Window loaded"
        );

        JoinedWindow::build(clicks, returns, segments_scanned, self.config.completion_threshold)
    }

    /// Click/return statistics over `range`, by video and by platform.
    pub fn get_external_video_stats(&self, range: StatsRange) -> ExternalVideoStats {
        let window = self.load_window(range);

        let mut totals = Tally::default();
        for video in window.videos.values() {
            totals.merge(&video.tally);
        }

        let by_video: Vec<VideoStats> = window.videos.values().map(VideoTally::to_stats).collect();

        let mut top_videos = by_video.clone();
        top_videos.sort_by(|a, b| {
            b.total_clicks
                .cmp(&a.total_clicks)
                .then_with(|| a.video_id.cmp(&b.video_id))
        });
        top_videos.truncate(self.config.top_videos_limit);

        let by_platform = JoinedWindow::platform_tallies(window.videos.values())
            .iter()
            .map(|(platform, tally)| platform_stats(*platform, tally))
            .collect();

        info!(
            %range,
            clicks = totals.clicks,
            returns = totals.returns,
            videos = by_video.len(),
            orphaned = window.orphaned_returns,
            "External video stats computed"
        );

        ExternalVideoStats {
            range,
            generated_at: self.clock.now(),
            total_clicks: totals.clicks,
            total_returns: totals.returns,
            return_rate: safe_rate(totals.returns, totals.clicks),
            estimated_completions: totals.completions,
            estimated_completion_rate: safe_rate(totals.completions, totals.returns),
            average_time_spent: totals.average_time_spent(),
            by_video,
            by_platform,
            top_videos,
            segments_scanned: window.segments_scanned,
            orphaned_returns: window.orphaned_returns,
        }
    }

    /// Per-video completion estimates over `range`, optionally filtered.
    pub fn get_completion_estimates(
        &self,
        range: StatsRange,
        filters: &EstimateFilters,
    ) -> CompletionReport {
        let window = self.load_window(range);

        let selected: Vec<&VideoTally> = window
            .videos
            .values()
            .filter(|v| filters.matches(&v.video_id, v.platform))
            .collect();

        let mut estimates: Vec<CompletionEstimate> =
            selected.iter().map(|v| self.estimate(v)).collect();
        estimates.sort_by(|a, b| {
            b.total_clicks
                .cmp(&a.total_clicks)
                .then_with(|| a.video_id.cmp(&b.video_id))
        });

        let platform_summaries = JoinedWindow::platform_tallies(selected.iter().copied())
            .iter()
            .map(|(platform, tally)| platform_stats(*platform, tally))
            .collect();

        info!(
            %range,
            video_filter = ?filters.video_id,
            platform_filter = ?filters.platform,
            estimates = estimates.len(),
            "Completion estimates computed"
        );

        CompletionReport {
            range,
            generated_at: self.clock.now(),
            filters: filters.clone(),
            estimates,
            platform_summaries,
            segments_scanned: window.segments_scanned,
            orphaned_returns: window.orphaned_returns,
        }
    }

    fn estimate(&self, video: &VideoTally) -> CompletionEstimate {
        let t = &video.tally;
        CompletionEstimate {
            video_id: video.video_id.clone(),
            video_title: video.video_title.clone(),
            platform: video.platform,
            total_clicks: t.clicks,
            total_returns: t.returns,
            return_rate: safe_rate(t.returns, t.clicks),
            estimated_completion_rate: safe_rate(t.completions, t.returns),
            completion_rate_interval: wilson_interval(
                t.completions,
                t.returns,
                self.config.interval_confidence_level,
            ),
            average_time_spent: t.average_time_spent(),
            average_watch_percentage: t.average_watch().to_percent(),
            confidence: confidence(t.returns, &self.config),
            sample_size: t.returns,
            data_quality: data_quality(t.complete_samples, t.returns, &self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{Confidence, DataQuality};
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn aggregator(log: &LogStore) -> Aggregator {
        Aggregator::new(
            log.clone(),
            Arc::new(ManualClock::new(now())),
            AggregationConfig::default(),
        )
    }

    fn click(id: &str, video: &str, platform: Platform, at: DateTime<Utc>) -> ClickEvent {
        ClickEvent {
            id: id.to_string(),
            video_id: video.to_string(),
            video_title: format!("Title {video}"),
            platform,
            click_time: at,
            session_id: "s".to_string(),
            user_id: None,
            referrer: String::new(),
            user_agent: String::new(),
        }
    }

    fn ret(id: &str, click_id: &str, at: DateTime<Utc>, ms: u64, pct: f64) -> ReturnEvent {
        ReturnEvent {
            id: id.to_string(),
            click_id: click_id.to_string(),
            return_time: at,
            time_spent_ms: ms,
            estimated_watch_percentage: Fraction::clamped(pct),
            session_id: "s".to_string(),
            user_id: None,
        }
    }

    fn today() -> NaiveDate {
        now().date_naive()
    }

    /// 100 clicks, 40 returns, 36 of which are >= 0.90
    fn seed_scenario_b(log: &LogStore, video: &str) {
        let t0 = now() - Duration::hours(2);
        for i in 0..100 {
            let c = click(&format!("{video}-c{i}"), video, Platform::LongForm, t0);
            log.append(EventKind::Click, today(), &c).unwrap();
        }
        for i in 0..40 {
            let pct = if i < 36 { 0.95 } else { 0.40 };
            let r = ret(
                &format!("{video}-r{i}"),
                &format!("{video}-c{i}"),
                t0 + Duration::minutes(5),
                120_000,
                pct,
            );
            log.append(EventKind::Return, today(), &r).unwrap();
        }
    }

    #[test]
    fn test_scenario_b_rates_and_confidence() {
        let log = LogStore::in_memory();
        seed_scenario_b(&log, "v1");
        let agg = aggregator(&log);

        let stats = agg.get_external_video_stats(StatsRange::Last7Days);
        assert_eq!(stats.total_clicks, 100);
        assert_eq!(stats.total_returns, 40);
        assert_eq!(stats.return_rate.get(), 40.0);
        assert_eq!(stats.estimated_completions, 36);
        assert_eq!(stats.estimated_completion_rate.get(), 90.0);
        assert_eq!(stats.average_time_spent, 120_000.0);
        assert_eq!(stats.by_video[0].total_time_spent, 40 * 120_000);

        let report = agg.get_completion_estimates(StatsRange::Last7Days, &EstimateFilters::default());
        let est = &report.estimates[0];
        assert_eq!(est.estimated_completion_rate.get(), 90.0);
        assert_eq!(est.return_rate.get(), 40.0);
        assert_eq!(est.sample_size, 40);
        assert_eq!(est.confidence, Confidence::Medium);
        assert_eq!(est.data_quality, DataQuality::High);
        assert!((est.average_watch_percentage.get() - 89.5).abs() < 1e-9);
    }

    #[test]
    fn test_scenario_c_partial_window() {
        let log = LogStore::in_memory();
        let t = now() - Duration::days(1);
        for (n, back) in [0i64, 2, 5].into_iter().enumerate() {
            let day = today() - Duration::days(back);
            let c = click(&format!("c{n}"), "v", Platform::ShortForm, t);
            log.append(EventKind::Click, day, &c).unwrap();
        }

        let stats = aggregator(&log).get_external_video_stats(StatsRange::Last7Days);
        assert_eq!(stats.total_clicks, 3);
        assert_eq!(stats.segments_scanned, 3);
        assert_eq!(stats.total_returns, 0);
        assert_eq!(stats.return_rate.get(), 0.0);
        assert_eq!(stats.estimated_completion_rate.get(), 0.0);
    }

    #[test]
    fn test_empty_store_yields_zeroes() {
        let agg = aggregator(&LogStore::in_memory());
        let stats = agg.get_external_video_stats(StatsRange::Last90Days);
        assert_eq!(stats.total_clicks, 0);
        assert!(stats.by_video.is_empty());
        assert_eq!(stats.average_time_spent, 0.0);

        let report = agg.get_completion_estimates(StatsRange::Last30Days, &EstimateFilters::default());
        assert!(report.estimates.is_empty());
        assert!(report.platform_summaries.is_empty());
    }

    #[test]
    fn test_orphaned_returns_excluded() {
        let log = LogStore::in_memory();
        let t0 = now() - Duration::hours(1);
        log.append(EventKind::Click, today(), &click("c1", "v", Platform::Other, t0)).unwrap();
        // Valid
        log.append(EventKind::Return, today(), &ret("r1", "c1", t0 + Duration::minutes(3), 60_000, 0.5)).unwrap();
        // Unknown click
        log.append(EventKind::Return, today(), &ret("r2", "missing", t0, 60_000, 0.5)).unwrap();
        // Not strictly after the click
        log.append(EventKind::Return, today(), &ret("r3", "c1", t0, 60_000, 0.5)).unwrap();

        let stats = aggregator(&log).get_external_video_stats(StatsRange::Last7Days);
        assert_eq!(stats.total_returns, 1);
        assert_eq!(stats.orphaned_returns, 2);
    }

    #[test]
    fn test_zero_clicks_with_returns_never_nan() {
        let log = LogStore::in_memory();
        log.append(EventKind::Return, today(), &ret("r", "gone", now(), 9_000, 0.3)).unwrap();
        let stats = aggregator(&log).get_external_video_stats(StatsRange::Last7Days);
        assert!(stats.return_rate.get().is_finite());
        assert_eq!(stats.return_rate.get(), 0.0);
        assert_eq!(stats.orphaned_returns, 1);
    }

    #[test]
    fn test_top_videos_ranked_by_clicks() {
        let log = LogStore::in_memory();
        let t = now() - Duration::hours(1);
        let counts = [("a", 2), ("b", 5), ("c", 5), ("d", 1)];
        for (video, n) in counts {
            for i in 0..n {
                let c = click(&format!("{video}{i}"), video, Platform::LongForm, t);
                log.append(EventKind::Click, today(), &c).unwrap();
            }
        }

        let mut agg = aggregator(&log);
        agg.config.top_videos_limit = 3;
        let stats = agg.get_external_video_stats(StatsRange::Last7Days);
        let ranking: Vec<&str> = stats.top_videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ranking, vec!["b", "c", "a"]);
        assert_eq!(stats.by_video.len(), 4);
    }

    #[test]
    fn test_first_non_empty_title_kept() {
        let log = LogStore::in_memory();
        let t = now() - Duration::hours(1);
        let mut untitled = click("c0", "v", Platform::LongForm, t);
        untitled.video_title = String::new();
        let mut first = click("c1", "v", Platform::LongForm, t);
        first.video_title = "Harbour walk".to_string();
        let mut renamed = click("c2", "v", Platform::LongForm, t);
        renamed.video_title = "Harbour walk (edited)".to_string();
        for c in [&untitled, &first, &renamed] {
            log.append(EventKind::Click, today(), c).unwrap();
        }

        let stats = aggregator(&log).get_external_video_stats(StatsRange::Last7Days);
        assert_eq!(stats.by_video.len(), 1);
        assert_eq!(stats.by_video[0].video_title, "Harbour walk");
        assert_eq!(stats.by_video[0].total_clicks, 3);
    }

    #[test]
    fn test_estimate_filters_and_platform_summaries() {
        let log = LogStore::in_memory();
        seed_scenario_b(&log, "long");
        let t = now() - Duration::hours(1);
        for i in 0..10 {
            let c = click(&format!("s{i}"), "short", Platform::ShortForm, t);
            log.append(EventKind::Click, today(), &c).unwrap();
            if i < 6 {
                let r = ret(&format!("sr{i}"), &format!("s{i}"), t + Duration::minutes(1), 50_000, 0.7);
                log.append(EventKind::Return, today(), &r).unwrap();
            }
        }
        let agg = aggregator(&log);

        let all = agg.get_completion_estimates(StatsRange::Last7Days, &EstimateFilters::default());
        let order: Vec<&str> = all.estimates.iter().map(|e| e.video_id.as_str()).collect();
        assert_eq!(order, vec!["long", "short"]);
        assert_eq!(all.platform_summaries.len(), 2);

        let filters = EstimateFilters {
            video_id: None,
            platform: Some(Platform::ShortForm),
        };
        let short = agg.get_completion_estimates(StatsRange::Last7Days, &filters);
        assert_eq!(short.estimates.len(), 1);
        let est = &short.estimates[0];
        assert_eq!(est.total_returns, 6);
        assert_eq!(est.confidence, Confidence::Low);
        assert_eq!(est.estimated_completion_rate.get(), 0.0);
        assert_eq!(short.platform_summaries.len(), 1);
        assert_eq!(short.platform_summaries[0].total_clicks, 10);

        let by_id = EstimateFilters {
            video_id: Some("nope".to_string()),
            platform: None,
        };
        assert!(agg.get_completion_estimates(StatsRange::Last7Days, &by_id).estimates.is_empty());
    }

    #[test]
    fn test_data_quality_counts_incomplete_samples() {
        let log = LogStore::in_memory();
        let t = now() - Duration::hours(1);
        for i in 0..10 {
            log.append(EventKind::Click, today(), &click(&format!("c{i}"), "v", Platform::Other, t)).unwrap();
            // 2 of 10 carry both dwell and estimate
            let (ms, pct) = if i < 2 { (30_000, 0.4) } else { (0, 0.0) };
            let r = ret(&format!("r{i}"), &format!("c{i}"), t + Duration::seconds(30), ms, pct);
            log.append(EventKind::Return, today(), &r).unwrap();
        }
        let report = aggregator(&log).get_completion_estimates(StatsRange::Last7Days, &EstimateFilters::default());
        assert_eq!(report.estimates[0].data_quality, DataQuality::Low);
    }
}
