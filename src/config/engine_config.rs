//! Engine Configuration - every tunable threshold as a TOML value
//!
//! Each struct implements `Default` with the values from [`super::defaults`],
//! so running with no config file behaves exactly like the documented model.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::{DurationBucket, Platform};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "ENGAGEMENT_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "engagement.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one deployment.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$ENGAGEMENT_CONFIG`
/// 2. `./engagement.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Client-side detection thresholds
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Platform correction factors
    #[serde(default)]
    pub platforms: PlatformConfig,

    /// Estimator thresholds
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order. Never fails; a
    /// broken file is reported and skipped.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all thresholds for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let t = &self.tracker;
        if t.min_dwell_ms >= t.max_dwell_ms {
            errors.push(format!(
                "tracker.min_dwell_ms ({}) must be less than max_dwell_ms ({})",
                t.min_dwell_ms, t.max_dwell_ms
            ));
        }
        if t.fallback_capacity == 0 {
            errors.push("tracker.fallback_capacity must be > 0".to_string());
        }
        if t.channel_capacity == 0 {
            errors.push("tracker.channel_capacity must be > 0".to_string());
        }
        if !t.user_factor_min.is_finite() || !t.user_factor_max.is_finite() {
            errors.push("tracker.user_factor bounds must be finite".to_string());
        } else if t.user_factor_min <= 0.0 || t.user_factor_min > t.user_factor_max {
            errors.push(format!(
                "tracker.user_factor_min ({:.2}) must be > 0 and <= user_factor_max ({:.2})",
                t.user_factor_min, t.user_factor_max
            ));
        }

        for platform in Platform::ALL {
            let f = self.platforms.corrections.for_platform(platform);
            for (bucket, value) in [("short", f.short), ("medium", f.medium), ("long", f.long)] {
                if !value.is_finite() || value <= 0.0 {
                    errors.push(format!(
                        "platforms.corrections.{}.{bucket} must be a positive finite number (got {value})",
                        platform.as_str().replace('-', "_")
                    ));
                }
            }
        }

        let a = &self.aggregation;
        if !(a.completion_threshold > 0.0 && a.completion_threshold <= 1.0) {
            errors.push(format!(
                "aggregation.completion_threshold ({}) must be in (0, 1]",
                a.completion_threshold
            ));
        }
        if a.medium_confidence_min_samples > a.high_confidence_min_samples {
            errors.push(format!(
                "aggregation.medium_confidence_min_samples ({}) must be <= high_confidence_min_samples ({})",
                a.medium_confidence_min_samples, a.high_confidence_min_samples
            ));
        }
        if !(0.0..=1.0).contains(&a.medium_quality_ratio)
            || !(0.0..=1.0).contains(&a.high_quality_ratio)
            || a.medium_quality_ratio > a.high_quality_ratio
        {
            errors.push(format!(
                "aggregation quality ratios must satisfy 0 <= medium ({}) <= high ({}) <= 1",
                a.medium_quality_ratio, a.high_quality_ratio
            ));
        }
        if !(a.interval_confidence_level > 0.0 && a.interval_confidence_level < 1.0) {
            errors.push(format!(
                "aggregation.interval_confidence_level ({}) must be in (0, 1)",
                a.interval_confidence_level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub body_limit_bytes: usize,
    /// Allowed cross-origin callers (the tracker usually runs on the content site's origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            body_limit_bytes: defaults::REQUEST_BODY_LIMIT_BYTES,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn event_db_path(&self) -> PathBuf {
        self.data_dir.join(defaults::EVENT_DB_NAME)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub min_dwell_ms: u64,
    pub max_dwell_ms: u64,
    pub fallback_capacity: usize,
    pub channel_capacity: usize,
    pub user_history_capacity: usize,
    pub user_factor_min: f64,
    pub user_factor_max: f64,
    /// Base URL of the ingestion service, e.g. `http://localhost:8080`
    pub ingest_url: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_dwell_ms: defaults::MIN_DWELL_MS,
            max_dwell_ms: defaults::MAX_DWELL_MS,
            fallback_capacity: defaults::FALLBACK_QUEUE_CAPACITY,
            channel_capacity: defaults::EMITTER_CHANNEL_CAPACITY,
            user_history_capacity: defaults::USER_HISTORY_CAPACITY,
            user_factor_min: defaults::USER_FACTOR_MIN,
            user_factor_max: defaults::USER_FACTOR_MAX,
            ingest_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub corrections: CorrectionTable,
}

/// Expected completion fraction per duration bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketFactors {
    pub short: f64,
    pub medium: f64,
    pub long: f64,
}

impl BucketFactors {
    pub fn get(&self, bucket: DurationBucket) -> f64 {
        match bucket {
            DurationBucket::Short => self.short,
            DurationBucket::Medium => self.medium,
            DurationBucket::Long => self.long,
        }
    }
}

/// Platform × duration-bucket correction factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionTable {
    pub short_form: BucketFactors,
    pub long_form: BucketFactors,
    pub other: BucketFactors,
}

impl CorrectionTable {
    pub fn for_platform(&self, platform: Platform) -> &BucketFactors {
        match platform {
            Platform::ShortForm => &self.short_form,
            Platform::LongForm => &self.long_form,
            Platform::Other => &self.other,
        }
    }

    pub fn factor(&self, platform: Platform, bucket: DurationBucket) -> f64 {
        self.for_platform(platform).get(bucket)
    }
}

impl Default for CorrectionTable {
    fn default() -> Self {
        Self {
            short_form: BucketFactors { short: 0.85, medium: 0.75, long: 0.60 },
            long_form: BucketFactors { short: 0.80, medium: 0.65, long: 0.45 },
            other: BucketFactors { short: 0.75, medium: 0.60, long: 0.50 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub completion_threshold: f64,
    pub high_confidence_min_samples: u64,
    pub medium_confidence_min_samples: u64,
    pub high_quality_ratio: f64,
    pub medium_quality_ratio: f64,
    pub top_videos_limit: usize,
    pub interval_confidence_level: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            completion_threshold: defaults::COMPLETION_THRESHOLD,
            high_confidence_min_samples: defaults::HIGH_CONFIDENCE_MIN_SAMPLES,
            medium_confidence_min_samples: defaults::MEDIUM_CONFIDENCE_MIN_SAMPLES,
            high_quality_ratio: defaults::HIGH_QUALITY_RATIO,
            medium_quality_ratio: defaults::MEDIUM_QUALITY_RATIO,
            top_videos_limit: defaults::TOP_VIDEOS_LIMIT,
            interval_confidence_level: defaults::INTERVAL_CONFIDENCE_LEVEL,
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("cannot parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracker.min_dwell_ms, 5_000);
        assert_eq!(config.tracker.max_dwell_ms, 1_800_000);
        assert_eq!(config.tracker.fallback_capacity, 100);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [server]
            addr = "127.0.0.1:9000"

            [platforms.corrections.short_form]
            short = 0.9
            medium = 0.8
            long = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(config.aggregation.top_videos_limit, 10);
        assert_eq!(
            config.platforms.corrections.factor(Platform::ShortForm, DurationBucket::Short),
            0.9
        );
        // Untouched platforms keep built-in factors
        assert_eq!(
            config.platforms.corrections.factor(Platform::LongForm, DurationBucket::Long),
            0.45
        );
    }

    #[test]
    fn test_rejects_inverted_dwell_thresholds() {
        let err = EngineConfig::from_toml_str(
            r#"
            [tracker]
            min_dwell_ms = 60000
            max_dwell_ms = 1000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.iter().any(|m| m.contains("min_dwell_ms"))));
    }

    #[test]
    fn test_rejects_non_positive_factor() {
        let mut config = EngineConfig::default();
        config.platforms.corrections.other.long = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_is_valid() {
        let toml = EngineConfig::default().to_toml().unwrap();
        assert!(EngineConfig::from_toml_str(&toml).is_ok());
    }
}
