//! Aggregation outputs: per-video / per-platform stats and completion estimates
//!
//! None of these are ever persisted. They are recomputed from the event log on
//! every query, including the confidence and data-quality labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Percent, Platform, StatsRange};

// ============================================================================
// Labels
// ============================================================================

/// How many return samples back an estimate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// Share of return samples carrying complete timing + estimate fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DataQuality {
    High,
    Medium,
    Low,
    NoData,
}

impl std::fmt::Display for DataQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataQuality::High => write!(f, "high"),
            DataQuality::Medium => write!(f, "medium"),
            DataQuality::Low => write!(f, "low"),
            DataQuality::NoData => write!(f, "no-data"),
        }
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Click/return figures for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStats {
    pub video_id: String,
    pub video_title: String,
    pub platform: Platform,
    pub total_clicks: u64,
    pub total_returns: u64,
    pub return_rate: Percent,
    /// Sum of dwell over attributed returns (ms)
    pub total_time_spent: u64,
    /// Mean dwell per attributed return (ms)
    pub average_time_spent: f64,
    pub estimated_completions: u64,
    pub estimated_completion_rate: Percent,
}

/// Click/return figures for one platform family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub platform: Platform,
    pub total_clicks: u64,
    pub total_returns: u64,
    pub return_rate: Percent,
    pub total_time_spent: u64,
    pub average_time_spent: f64,
    pub estimated_completions: u64,
    pub estimated_completion_rate: Percent,
}

/// Result of `get_external_video_stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalVideoStats {
    pub range: StatsRange,
    pub generated_at: DateTime<Utc>,
    pub total_clicks: u64,
    pub total_returns: u64,
    pub return_rate: Percent,
    pub estimated_completions: u64,
    pub estimated_completion_rate: Percent,
    pub average_time_spent: f64,
    pub by_video: Vec<VideoStats>,
    pub by_platform: Vec<PlatformStats>,
    /// Highest click volume first
    pub top_videos: Vec<VideoStats>,
    pub segments_scanned: usize,
    /// Returns with no earlier click in the window
    pub orphaned_returns: u64,
}

// ============================================================================
// Completion estimates
// ============================================================================

/// Two-sided interval on the percent scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateInterval {
    pub lower: Percent,
    pub upper: Percent,
}

impl RateInterval {
    pub const EMPTY: RateInterval = RateInterval {
        lower: Percent::ZERO,
        upper: Percent::ZERO,
    };
}

/// Estimated engagement for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEstimate {
    pub video_id: String,
    pub video_title: String,
    pub platform: Platform,
    pub total_clicks: u64,
    pub total_returns: u64,
    pub return_rate: Percent,
    pub estimated_completion_rate: Percent,
    /// 95% Wilson score interval around `estimated_completion_rate`
    pub completion_rate_interval: RateInterval,
    pub average_time_spent: f64,
    pub average_watch_percentage: Percent,
    pub confidence: Confidence,
    pub sample_size: u64,
    pub data_quality: DataQuality,
}

/// Optional narrowing for `get_completion_estimates`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl EstimateFilters {
    pub fn matches(&self, video_id: &str, platform: Platform) -> bool {
        self.video_id.as_deref().map_or(true, |v| v == video_id)
            && self.platform.map_or(true, |p| p == platform)
    }
}

/// Result of `get_completion_estimates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub range: StatsRange,
    pub generated_at: DateTime<Utc>,
    pub filters: EstimateFilters,
    pub estimates: Vec<CompletionEstimate>,
    pub platform_summaries: Vec<PlatformStats>,
    pub segments_scanned: usize,
    pub orphaned_returns: u64,
}
