//! Watch-percentage estimation from dwell time
//!
//! `estimate = min(1, dwell / nominal × platformFactor × userFactor)`
//!
//! `userFactor` is the mean of the visitor's recent completion estimates,
//! clamped to a configured band, or 1 with no history.

use std::collections::VecDeque;

use crate::types::{Fraction, NominalDuration};

/// Estimate how much of a video was watched from the time spent away.
pub fn estimate_watch_percentage(
    dwell_ms: u64,
    nominal: &NominalDuration,
    platform_factor: f64,
    user_factor: f64,
) -> Fraction {
    let nominal_ms = nominal.as_millis_f64();
    if nominal_ms <= 0.0 {
        return Fraction::ZERO;
    }
    let raw = (dwell_ms as f64 / nominal_ms) * platform_factor * user_factor;
    Fraction::clamped(raw.min(1.0))
}

/// Recent completion estimates for one visitor, oldest first.
#[derive(Debug, Clone)]
pub struct UserHistory {
    rates: VecDeque<Fraction>,
    capacity: usize,
}

impl UserHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            rates: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a completion rate, evicting the oldest past capacity.
    pub fn record(&mut self, rate: Fraction) {
        if self.rates.len() >= self.capacity {
            self.rates.pop_front();
        }
        self.rates.push_back(rate);
    }

    pub fn seed<I: IntoIterator<Item = Fraction>>(&mut self, rates: I) {
        for rate in rates {
            self.record(rate);
        }
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Mean prior rate clamped to `[min, max]`; 1.0 without history.
    pub fn factor(&self, min: f64, max: f64) -> f64 {
        if self.rates.is_empty() {
            return 1.0;
        }
        let mean = self.rates.iter().map(|r| r.get()).sum::<f64>() / self.rates.len() as f64;
        mean.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;
    use std::time::Duration;

    fn nominal_secs(secs: u64) -> NominalDuration {
        NominalDuration::resolve(Some(Duration::from_secs(secs)), Platform::ShortForm)
    }

    #[test]
    fn test_short_form_sixty_seconds() {
        // 54s on a 60s short-form video, factor 0.85, no history
        let est = estimate_watch_percentage(54_000, &nominal_secs(60), 0.85, 1.0);
        assert!((est.get() - 0.765).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_caps_at_one() {
        let est = estimate_watch_percentage(1_800_000, &nominal_secs(60), 0.85, 1.5);
        assert_eq!(est, Fraction::ONE);
    }

    #[test]
    fn test_estimate_in_unit_interval_across_dwell_range() {
        let nominal = nominal_secs(300);
        for dwell in (5_000..=1_800_000).step_by(7_919) {
            for factor in [0.45, 0.85] {
                for user in [0.5, 1.0, 1.5] {
                    let est = estimate_watch_percentage(dwell, &nominal, factor, user).get();
                    assert!((0.0..=1.0).contains(&est), "dwell {dwell} gave {est}");
                }
            }
        }
    }

    #[test]
    fn test_user_factor_clamped() {
        let mut history = UserHistory::new(20);
        assert_eq!(history.factor(0.5, 1.5), 1.0);

        history.seed([Fraction::clamped(0.1), Fraction::clamped(0.2)]);
        assert_eq!(history.factor(0.5, 1.5), 0.5);

        let mut full = UserHistory::new(20);
        full.seed([Fraction::ONE; 3]);
        assert_eq!(full.factor(0.5, 1.5), 1.0);
        assert_eq!(full.factor(0.5, 0.9), 0.9);
    }

    #[test]
    fn test_history_bounded() {
        let mut history = UserHistory::new(3);
        history.seed([Fraction::ZERO, Fraction::ONE, Fraction::ONE, Fraction::ONE]);
        assert_eq!(history.len(), 3);
        // The leading zero was evicted
        assert_eq!(history.factor(0.0, 2.0), 1.0);
    }
}
