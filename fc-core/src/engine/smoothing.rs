//! Temperature smoothing
//!
//! Keeps the last [`history::CAPACITY`] raw readings (one per tick). Slots
//! start at zero and a zero slot counts as "not populated yet", so a young
//! history averages only what it has seen.

use std::collections::VecDeque;

use crate::constants::history;

/// Ring buffer of raw temperature samples
#[derive(Debug, Clone)]
pub struct TemperatureHistory {
    samples: VecDeque<f64>,
}

impl Default for TemperatureHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl TemperatureHistory {
    pub fn new() -> Self {
        Self::with_capacity(history::CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: std::iter::repeat(0.0).take(capacity).collect(),
        }
    }

    /// Overwrite the oldest slot with `sample`
    pub fn push(&mut self, sample: f64) {
        self.samples.pop_front();
        self.samples.push_back(sample);
    }

    /// Most recent sample, if any slot has been populated
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied().filter(|s| is_populated(*s))
    }

    /// Mean of the last `window` populated samples
    ///
    /// Returns `fallback` when nothing has been recorded yet.
    pub fn moving_average(&self, window: usize, fallback: f64) -> f64 {
        let (sum, count) = self
            .samples
            .iter()
            .rev()
            .copied()
            .filter(|s| is_populated(*s))
            .take(window)
            .fold((0.0, 0usize), |(sum, count), s| (sum + s, count + 1));

        if count == 0 {
            return fallback;
        }
        round(sum / count as f64)
    }

    /// Temperature fed to the curve
    ///
    /// The cooler of the instantaneous reading and the moving average, so a
    /// short spike does not spin the fan up. At or above `critical` the raw
    /// reading is used as is.
    pub fn effective_temperature(&self, instant: f64, window: usize, critical: Option<f64>) -> f64 {
        if matches!(critical, Some(limit) if instant >= limit) {
            return instant;
        }
        let average = self.moving_average(window, instant);
        // rounding must not lift the result above the reading
        round(instant.min(average)).min(instant)
    }
}

fn is_populated(sample: f64) -> bool {
    sample > 0.0
}

/// Round to the precision used for reported temperatures
pub fn round(value: f64) -> f64 {
    let factor = 10f64.powi(history::DECIMALS);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_falls_back() {
        let history = TemperatureHistory::new();
        assert_eq!(history.moving_average(20, 47.5), 47.5);
        assert_eq!(history.latest(), None);
    }

    #[test]
    fn test_unpopulated_slots_are_ignored() {
        let mut history = TemperatureHistory::new();
        history.push(50.0);
        history.push(60.0);
        assert_eq!(history.moving_average(100, 0.0), 55.0);
        assert_eq!(history.latest(), Some(60.0));
    }

    #[test]
    fn test_window_takes_most_recent_samples() {
        let mut history = TemperatureHistory::new();
        for t in [40.0, 40.0, 70.0, 80.0] {
            history.push(t);
        }
        assert_eq!(history.moving_average(2, 0.0), 75.0);
        assert_eq!(history.moving_average(3, 0.0), 63.33);
    }

    #[test]
    fn test_identical_samples_average_to_themselves() {
        let mut history = TemperatureHistory::new();
        for _ in 0..30 {
            history.push(61.37);
        }
        for window in [1, 5, 20, 30] {
            assert_eq!(history.moving_average(window, 0.0), 61.37);
        }
    }

    #[test]
    fn test_oldest_sample_is_overwritten() {
        let mut history = TemperatureHistory::with_capacity(3);
        for t in [90.0, 30.0, 30.0, 30.0] {
            history.push(t);
        }
        assert_eq!(history.moving_average(10, 0.0), 30.0);
    }

    #[test]
    fn test_effective_never_exceeds_instant() {
        let mut history = TemperatureHistory::new();
        for t in [80.0, 80.0, 80.0] {
            history.push(t);
        }
        history.push(50.005);
        let effective = history.effective_temperature(50.005, 20, None);
        assert!(effective <= 50.005);

        // spike is damped by the cooler history
        let mut history = TemperatureHistory::new();
        for t in [45.0, 45.0, 45.0, 90.0] {
            history.push(t);
        }
        assert_eq!(history.effective_temperature(90.0, 4, None), 56.25);
    }

    #[test]
    fn test_critical_temperature_bypasses_smoothing() {
        let mut history = TemperatureHistory::new();
        for t in [45.0, 45.0, 45.0, 95.0] {
            history.push(t);
        }
        assert_eq!(history.effective_temperature(95.0, 4, Some(90.0)), 95.0);
        assert_eq!(history.effective_temperature(90.0, 4, Some(90.0)), 90.0);
        assert!(history.effective_temperature(89.0, 4, Some(90.0)) < 89.0);
    }
}
