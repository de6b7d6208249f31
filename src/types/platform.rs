//! Hosting platforms, duration buckets and nominal durations

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::defaults;

// ============================================================================
// Platform
// ============================================================================

/// External platform family a video is hosted on.
///
/// Unknown wire values deserialize to `Other` so a new platform name coming
/// from an older client never rejects the whole record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// Vertical, sub-minute formats (Shorts, TikTok, Reels)
    ShortForm,
    /// Classic long-form players (YouTube watch pages, Vimeo)
    LongForm,
    #[default]
    #[serde(other)]
    Other,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::ShortForm, Platform::LongForm, Platform::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::ShortForm => "short-form",
            Platform::LongForm => "long-form",
            Platform::Other => "other",
        }
    }

    /// Default nominal duration when the catalog has nothing for a video.
    pub fn default_duration(&self) -> Duration {
        match self {
            Platform::ShortForm => Duration::from_secs(defaults::SHORT_FORM_DEFAULT_DURATION_SECS),
            Platform::LongForm => Duration::from_secs(defaults::LONG_FORM_DEFAULT_DURATION_SECS),
            Platform::Other => Duration::from_secs(defaults::OTHER_DEFAULT_DURATION_SECS),
        }
    }

    /// Guess the platform family from an outbound URL.
    pub fn detect(url: &str) -> Platform {
        static SHORT: OnceLock<Option<Regex>> = OnceLock::new();
        static LONG: OnceLock<Option<Regex>> = OnceLock::new();

        let short = SHORT.get_or_init(|| {
            Regex::new(r"(?i)(youtube\.com/shorts/|tiktok\.com/|instagram\.com/reels?/|facebook\.com/reel/)").ok()
        });
        let long = LONG.get_or_init(|| {
            Regex::new(r"(?i)(youtube\.com/(watch|embed|live)|youtu\.be/|vimeo\.com/|dailymotion\.com/video/)").ok()
        });

        if short.as_ref().is_some_and(|re| re.is_match(url)) {
            Platform::ShortForm
        } else if long.as_ref().is_some_and(|re| re.is_match(url)) {
            Platform::LongForm
        } else {
            Platform::Other
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short-form" | "short_form" | "shortform" => Ok(Platform::ShortForm),
            "long-form" | "long_form" | "longform" => Ok(Platform::LongForm),
            "other" => Ok(Platform::Other),
            other => Err(format!(
                "unknown platform '{other}' (expected short-form, long-form or other)"
            )),
        }
    }
}

// ============================================================================
// Duration buckets
// ============================================================================

/// Coarse length class used to pick a platform correction factor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DurationBucket {
    /// <= 60 s
    Short,
    /// <= 10 min
    Medium,
    Long,
}

impl DurationBucket {
    pub fn of(duration: Duration) -> Self {
        let secs = duration.as_secs();
        if secs <= defaults::SHORT_BUCKET_MAX_SECS {
            DurationBucket::Short
        } else if secs <= defaults::MEDIUM_BUCKET_MAX_SECS {
            DurationBucket::Medium
        } else {
            DurationBucket::Long
        }
    }
}

// ============================================================================
// Nominal duration
// ============================================================================

/// Where a nominal duration came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DurationSource {
    Catalog,
    PlatformDefault,
}

/// Expected playback length used as the denominator of a watch estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NominalDuration {
    pub duration: Duration,
    pub source: DurationSource,
}

impl NominalDuration {
    /// Catalog duration when known and non-zero, platform default otherwise.
    pub fn resolve(catalog: Option<Duration>, platform: Platform) -> Self {
        match catalog {
            Some(duration) if !duration.is_zero() => Self {
                duration,
                source: DurationSource::Catalog,
            },
            _ => Self {
                duration: platform.default_duration(),
                source: DurationSource::PlatformDefault,
            },
        }
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.duration.as_millis() as f64
    }

    pub fn bucket(&self) -> DurationBucket {
        DurationBucket::of(self.duration)
    }
}
