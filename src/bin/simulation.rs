//! Visitor Simulation
//!
//! Drives interaction trackers with synthetic visitors, pushes their events
//! through the in-process ingestion path into an in-memory event log, and
//! prints the resulting completion estimates as JSON.
//!
//! Visitor behaviour per outbound click:
//! - some never come back (tracker expires)
//! - some switch tabs by accident (dwell under the minimum)
//! - the rest dwell for a log-normal share of the video's length
//!
//! # Usage
//! ```bash
//! ./simulation --visitors 200 --days 14 --seed 7 > report.json
//! ```

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, LogNormal};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use engagement_engine::clock::{Clock, ManualClock};
use engagement_engine::config::{defaults, EngineConfig};
use engagement_engine::storage::LogStore;
use engagement_engine::tracker::{
    fallback, transport_for, FallbackQueue, RecordingHost, SessionInfo, StaticCatalog, Submitter,
    Tracker, VideoRef, Visibility,
};
use engagement_engine::types::{CompletionReport, EstimateFilters, StatsRange};
use engagement_engine::{Aggregator, IngestionService};

// ============================================================================
// Video Catalog
// ============================================================================

struct SimVideo {
    id: &'static str,
    title: &'static str,
    url: &'static str,
    duration_secs: u64,
    /// Median share of the video a returning visitor watches
    engagement: f64,
}

const VIDEOS: &[SimVideo] = &[
    SimVideo {
        id: "lisbon-trams",
        title: "Riding every tram line in Lisbon",
        url: "https://www.youtube.com/watch?v=lisbon",
        duration_secs: 540,
        engagement: 0.55,
    },
    SimVideo {
        id: "kyoto-alleys",
        title: "Kyoto back alleys at dawn",
        url: "https://www.youtube.com/shorts/kyoto",
        duration_secs: 45,
        engagement: 0.9,
    },
    SimVideo {
        id: "patagonia-trek",
        title: "Eight days on the W trek",
        url: "https://vimeo.com/patagonia",
        duration_secs: 1_380,
        engagement: 0.35,
    },
    SimVideo {
        id: "street-food-hanoi",
        title: "Hanoi street food in 60 seconds",
        url: "https://www.tiktok.com/@travel/video/hanoi",
        duration_secs: 58,
        engagement: 0.8,
    },
    SimVideo {
        id: "fjord-cruise",
        title: "Norwegian fjord cruise",
        url: "https://example-video-host.net/fjords",
        duration_secs: 240,
        engagement: 0.5,
    },
];

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "engagement-simulation")]
#[command(about = "Synthetic visitor simulation for the engagement engine")]
#[command(version)]
struct Args {
    /// Number of distinct visitors
    #[arg(long, default_value = "150")]
    visitors: usize,

    /// Outbound clicks per visitor
    #[arg(long, default_value = "4")]
    clicks_per_visitor: usize,

    /// Simulated span in days (1-90)
    #[arg(long, default_value = "14", value_parser = clap::value_parser!(u32).range(1..=90))]
    days: u32,

    /// Share of clicks that never come back
    #[arg(long, default_value = "0.15")]
    abandon_rate: f64,

    /// Share of clicks that come back almost immediately
    #[arg(long, default_value = "0.08")]
    accidental_rate: f64,

    /// Aggregation window for the printed report
    #[arg(long, default_value = "30d")]
    range: StatsRange,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Send events to a running ingestion server instead of an in-memory log
    /// (overrides `tracker.ingest_url`)
    #[arg(long, value_name = "URL")]
    ingest_url: Option<String>,
}

// ============================================================================
// Simulation
// ============================================================================

#[derive(Debug, Default)]
struct SimStats {
    clicks: usize,
    returns: usize,
    discarded: usize,
    expired: usize,
}

fn dwell_for(video: &SimVideo, rng: &mut StdRng) -> Result<u64> {
    let median_secs = video.duration_secs as f64 * video.engagement;
    let dist = LogNormal::new(median_secs.ln(), 0.6).context("invalid dwell distribution")?;
    let secs = dist.sample(rng).clamp(5.0, 1_700.0);
    Ok((secs * 1000.0) as u64)
}

/// Estimates from the server the events were sent to.
async fn fetch_remote_report(base_url: &str, range: StatsRange) -> Result<CompletionReport> {
    let url = format!(
        "{}/api/v1/estimates?range={}",
        base_url.trim_end_matches('/'),
        range.as_str()
    );
    let report = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to query {url}"))?
        .error_for_status()?
        .json::<CompletionReport>()
        .await
        .context("Unexpected estimates response")?;
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = EngineConfig::load();
    let ingest_url = args
        .ingest_url
        .clone()
        .or_else(|| config.tracker.ingest_url.clone())
        .filter(|u| !u.trim().is_empty());

    let mut rng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let start = Utc::now() - ChronoDuration::days(args.days as i64);
    let clock = Arc::new(ManualClock::new(start));
    let log = LogStore::in_memory();
    let ingest = IngestionService::new(log.clone(), clock.clone());

    let catalog = VIDEOS.iter().fold(StaticCatalog::new(), |c, v| {
        c.with(v.id, Duration::from_secs(v.duration_secs))
    });
    let catalog = Arc::new(catalog);

    let fallback_queue = FallbackQueue::shared(config.tracker.fallback_capacity);
    let transport = transport_for(ingest_url.as_deref(), ingest.clone())
        .context("Failed to build event transport")?;
    let (submitter, emitter) = Submitter::new(
        transport.clone(),
        fallback_queue.clone(),
        config.tracker.channel_capacity,
        Duration::from_secs(defaults::FALLBACK_RETRY_SECS),
    );
    let cancel = CancellationToken::new();
    let submitter_task = tokio::spawn(submitter.run(cancel.clone()));

    info!(
        visitors = args.visitors,
        clicks_per_visitor = args.clicks_per_visitor,
        days = args.days,
        transport = transport.name(),
        "Simulation starting"
    );

    let total_clicks = (args.visitors * args.clicks_per_visitor).max(1);
    let gap_ms = (args.days as i64 * 86_400_000) / total_clicks as i64;
    let mut stats = SimStats::default();

    for visitor in 0..args.visitors {
        let session = SessionInfo {
            user_id: Some(format!("visitor-{visitor}")),
            referrer: "/blog".to_string(),
            user_agent: "simulation".to_string(),
            ..SessionInfo::anonymous()
        };
        let mut tracker = Tracker::new(
            RecordingHost::default(),
            emitter.clone(),
            clock.clone(),
            config.tracker.clone(),
            config.platforms.corrections.clone(),
        )
        .with_catalog(catalog.clone())
        .with_session(session);

        for _ in 0..args.clicks_per_visitor {
            let video = &VIDEOS[rng.gen_range(0..VIDEOS.len())];
            tracker.track_click(
                VideoRef::new(video.id).title(video.title).url(video.url),
                None,
            );
            stats.clicks += 1;

            let roll: f64 = rng.gen();
            let dwell_ms = if roll < args.abandon_rate {
                config.tracker.max_dwell_ms + 60_000
            } else if roll < args.abandon_rate + args.accidental_rate {
                rng.gen_range(500..config.tracker.min_dwell_ms)
            } else {
                dwell_for(video, &mut rng)?
            };

            clock.advance_ms(dwell_ms as i64);
            let summary = tracker.handle_visibility(Visibility::Visible);
            stats.returns += summary.emitted.len();
            stats.discarded += summary.discarded;
            stats.expired += summary.expired;

            clock.advance_ms(gap_ms.max(1));
            tokio::task::yield_now().await;
        }
    }

    drop(emitter);
    submitter_task.await.context("submitter task failed")?;
    cancel.cancel();

    let retried = fallback::retry(&fallback_queue, transport.as_ref()).await;
    info!(
        clicks = stats.clicks,
        returns = stats.returns,
        discarded = stats.discarded,
        expired = stats.expired,
        fallback_sent = retried.sent,
        "Simulation finished"
    );

    let report = match &ingest_url {
        Some(url) => fetch_remote_report(url, args.range).await?,
        None => Aggregator::new(log, clock.clone(), config.aggregation.clone())
            .get_completion_estimates(args.range, &EstimateFilters::default()),
    };
    for est in &report.estimates {
        info!(
            video = %est.video_id,
            platform = %est.platform,
            clicks = est.total_clicks,
            return_rate = %est.return_rate,
            completion = %est.estimated_completion_rate,
            confidence = %est.confidence,
            quality = %est.data_quality,
            "Estimate"
        );
    }
    info!(today = %clock.today(), "Report generated");

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
