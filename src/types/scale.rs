//! Fraction (0..=1) and percent (0..=100) scales.
//!
//! Per-event watch estimates live on the fraction scale; aggregate rates are
//! reported on the percent scale. Keeping them as distinct types means the
//! only way across is [`Fraction::to_percent`].

use serde::{Deserialize, Serialize};

/// A value in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fraction(f64);

impl Fraction {
    pub const ZERO: Fraction = Fraction(0.0);
    pub const ONE: Fraction = Fraction(1.0);

    /// Strict constructor: `None` for NaN, infinities and out-of-range values.
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(Self(value))
    }

    /// Saturating constructor. NaN maps to zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }

    pub fn to_percent(self) -> Percent {
        Percent::clamped(self.0 * 100.0)
    }
}

/// A value in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(f64);

impl Percent {
    pub const ZERO: Percent = Percent(0.0);

    /// Saturating constructor. NaN maps to zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 100.0))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_bounds() {
        assert!(Fraction::new(0.0).is_some());
        assert!(Fraction::new(1.0).is_some());
        assert!(Fraction::new(1.0001).is_none());
        assert!(Fraction::new(-0.1).is_none());
        assert!(Fraction::new(f64::NAN).is_none());
        assert!(Fraction::new(f64::INFINITY).is_none());
    }

    #[test]
    fn test_clamped_never_escapes_range() {
        assert_eq!(Fraction::clamped(7.0).get(), 1.0);
        assert_eq!(Fraction::clamped(-3.0).get(), 0.0);
        assert_eq!(Fraction::clamped(f64::NAN).get(), 0.0);
        assert_eq!(Percent::clamped(f64::INFINITY).get(), 100.0);
        assert_eq!(Percent::clamped(f64::NAN).get(), 0.0);
    }

    #[test]
    fn test_fraction_to_percent() {
        let p = Fraction::clamped(0.9).to_percent();
        assert!((p.get() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_transparent_serialization() {
        assert_eq!(serde_json::to_string(&Fraction::clamped(0.5)).unwrap(), "0.5");
        assert_eq!(serde_json::to_string(&Percent::clamped(40.0)).unwrap(), "40.0");
    }
}
