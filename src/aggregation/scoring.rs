//! Rate arithmetic and label scoring
//!
//! Every ratio surfaced by the aggregator goes through [`ratio`], which
//! reports a [`DivisionGuard`] instead of producing NaN or infinity. Public
//! helpers normalise the guard to 0 so it never leaves this crate.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::AggregationConfig;
use crate::types::{Confidence, DataQuality, Percent, RateInterval};

/// Why a ratio could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DivisionGuard {
    ZeroDenominator,
    NonFinite,
}

pub(crate) fn ratio(numerator: f64, denominator: f64) -> Result<f64, DivisionGuard> {
    if denominator == 0.0 {
        return Err(DivisionGuard::ZeroDenominator);
    }
    let value = numerator / denominator;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DivisionGuard::NonFinite)
    }
}

/// `numerator / denominator × 100`, exactly 0 on a zero denominator.
pub fn safe_rate(numerator: u64, denominator: u64) -> Percent {
    ratio(numerator as f64, denominator as f64)
        .map(|r| Percent::clamped(r * 100.0))
        .unwrap_or(Percent::ZERO)
}

/// Arithmetic mean, exactly 0 for an empty sample.
pub fn safe_mean(sum: f64, count: u64) -> f64 {
    ratio(sum, count as f64).unwrap_or(0.0)
}

/// Confidence label from the number of return samples.
pub fn confidence(sample_size: u64, cfg: &AggregationConfig) -> Confidence {
    if sample_size >= cfg.high_confidence_min_samples {
        Confidence::High
    } else if sample_size >= cfg.medium_confidence_min_samples {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Data-quality label from the share of complete return samples.
pub fn data_quality(complete: u64, total: u64, cfg: &AggregationConfig) -> DataQuality {
    let r = match ratio(complete as f64, total as f64) {
        Ok(r) if r > 0.0 => r,
        _ => return DataQuality::NoData,
    };

    if r >= cfg.high_quality_ratio {
        DataQuality::High
    } else if r >= cfg.medium_quality_ratio {
        DataQuality::Medium
    } else {
        DataQuality::Low
    }
}

/// Wilson score interval for `successes / trials` on the percent scale.
///
/// Empty samples give `[0, 0]`.
pub fn wilson_interval(successes: u64, trials: u64, level: f64) -> RateInterval {
    if trials == 0 {
        return RateInterval::EMPTY;
    }

    let z = match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.inverse_cdf(1.0 - (1.0 - level) / 2.0),
        Err(_) => return RateInterval::EMPTY,
    };
    if !z.is_finite() {
        return RateInterval::EMPTY;
    }

    let n = trials as f64;
    let p = (successes.min(trials)) as f64 / n;
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let centre = (p + z2 / (2.0 * n)) / denom;
    let half = z * ((p * (1.0 - p) / n) + z2 / (4.0 * n * n)).sqrt() / denom;

    RateInterval {
        lower: Percent::clamped((centre - half) * 100.0),
        upper: Percent::clamped((centre + half) * 100.0),
    }
}
