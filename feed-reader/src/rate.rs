//! Target read rate as a function of the subscriber population.

use std::time::Duration;

use crate::error::ReaderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePolicy {
    min: f64,
    max: f64,
    per_subscriber: f64,
    fixed: Option<f64>,
}

impl RatePolicy {
    pub fn new(
        min: f64,
        max: f64,
        per_subscriber: f64,
        fixed: Option<f64>,
    ) -> Result<Self, ReaderError> {
        if pause(min).is_none() {
            return Err(ReaderError::InvalidConfiguration(format!(
                "minimum rate must be positive with a representable pause, got {min}"
            )));
        }
        if !(max.is_finite() && max >= min) {
            return Err(ReaderError::InvalidConfiguration(format!(
                "maximum rate {max} is below the minimum {min}"
            )));
        }
        if !(per_subscriber.is_finite() && per_subscriber >= 0.0) {
            return Err(ReaderError::InvalidConfiguration(format!(
                "per subscriber rate must not be negative, got {per_subscriber}"
            )));
        }
        if let Some(fixed) = fixed {
            if pause(fixed).is_none() {
                return Err(ReaderError::InvalidConfiguration(format!(
                    "fixed rate must be positive with a representable pause, got {fixed}"
                )));
            }
        }

        Ok(Self {
            min,
            max,
            per_subscriber,
            fixed,
        })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    /// Reads per second for `population` subscribers. A fixed rate wins over the formula.
    pub fn rate(&self, population: u64) -> f64 {
        if let Some(fixed) = self.fixed {
            return fixed;
        }
        (population as f64 * self.per_subscriber).clamp(self.min, self.max)
    }

    /// Pause between two reads at the rate for `population`. Rates never go below the
    /// minimum, whose pause was checked on construction.
    pub fn interval(&self, population: u64) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate(population))
    }

    /// Pause used while nobody is subscribed.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.min)
    }
}

/// Time between two reads at `rate` per second, if that is a valid positive duration.
fn pause(rate: f64) -> Option<Duration> {
    if !(rate.is_finite() && rate > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / rate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RatePolicy {
        RatePolicy::new(1.0, 200.0, 0.5, None).unwrap()
    }

    #[test]
    fn test_rate_is_bounded() {
        let policy = policy();
        for population in [0, 1, 2, 3, 10, 399, 400, 401, 10_000, u64::MAX] {
            let rate = policy.rate(population);
            assert!(rate >= 1.0, "rate {rate} for {population}");
            assert!(rate <= 200.0, "rate {rate} for {population}");
        }
    }

    #[test]
    fn test_rate_never_decreases_with_population() {
        let policy = policy();
        let mut previous = policy.rate(0);
        for population in 1..2_000 {
            let rate = policy.rate(population);
            assert!(rate >= previous, "rate dropped at {population}");
            previous = rate;
        }
    }

    #[test]
    fn test_empty_population_maps_to_minimum() {
        assert_eq!(policy().rate(0), 1.0);
        assert_eq!(policy().idle_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_formula_between_bounds() {
        assert_eq!(policy().rate(100), 50.0);
        let interval = policy().interval(100).as_secs_f64();
        assert!((interval - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_rate_overrides() {
        let policy = RatePolicy::new(1.0, 200.0, 0.5, Some(4.0)).unwrap();
        assert_eq!(policy.rate(0), 4.0);
        assert_eq!(policy.rate(1_000_000), 4.0);
        assert_eq!(policy.interval(7), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_policies_are_rejected() {
        assert!(RatePolicy::new(0.0, 10.0, 1.0, None).is_err());
        assert!(RatePolicy::new(5.0, 1.0, 1.0, None).is_err());
        assert!(RatePolicy::new(1.0, 10.0, -1.0, None).is_err());
        assert!(RatePolicy::new(1.0, 10.0, 1.0, Some(0.0)).is_err());
        assert!(RatePolicy::new(1.0, f64::NAN, 1.0, None).is_err());
    }

    #[test]
    fn test_rates_too_small_for_a_pause_are_rejected() {
        assert!(RatePolicy::new(1e-320, 1.0, 0.5, None).is_err());
        assert!(RatePolicy::new(1.0, 10.0, 0.5, Some(1e-320)).is_err());

        let slow = RatePolicy::new(1e-6, 1.0, 0.0, None).unwrap();
        assert_eq!(slow.idle_interval(), Duration::from_secs(1_000_000));
        assert_eq!(slow.interval(u64::MAX), Duration::from_secs(1_000_000));
    }
}
