//! Market-price data shapes shared by every oracle variant.

use serde::Serialize;

/// Fixed length of the recent-price history carried by a sample.
pub const HISTORY_LEN: usize = 24;

/// Cache key for a spot-price lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceKey {
    pub instance_type: String,
    pub zone: String,
}

impl PriceKey {
    pub fn new(instance_type: &str, zone: &str) -> Self {
        Self {
            instance_type: instance_type.to_string(),
            zone: zone.to_string(),
        }
    }
}

/// One normalized market observation for an `(instance_type, zone)` pair.
///
/// `history` is oldest-first, always exactly [`HISTORY_LEN`] entries, and
/// its last entry equals `current`. `volatility` is the sample standard
/// deviation of the history.
#[derive(Debug, Clone, Serialize)]
pub struct PriceSample {
    pub current: f64,
    pub on_demand: f64,
    pub history: Vec<f64>,
    pub volatility: f64,
    pub last_updated_ms: u64,
}

impl PriceSample {
    /// Build a normalized sample from a raw oldest-first price series.
    ///
    /// Short histories are padded at the front by repeating the oldest
    /// value; long histories keep only the last [`HISTORY_LEN`] entries.
    /// The final entry is forced to `current`.
    pub fn from_history(
        current: f64,
        on_demand: f64,
        raw: &[f64],
        volatility: Option<f64>,
        last_updated_ms: u64,
    ) -> Self {
        let mut history: Vec<f64> = if raw.is_empty() {
            vec![current]
        } else {
            raw.to_vec()
        };

        if *history.last().unwrap_or(&current) != current {
            history.push(current);
        }

        if history.len() > HISTORY_LEN {
            history = history[history.len() - HISTORY_LEN..].to_vec();
        } else if history.len() < HISTORY_LEN {
            let oldest = history[0];
            let mut padded = vec![oldest; HISTORY_LEN - history.len()];
            padded.extend(history);
            history = padded;
        }

        let volatility = volatility.unwrap_or_else(|| sample_std_dev(&history));

        Self {
            current,
            on_demand,
            history,
            volatility,
            last_updated_ms,
        }
    }

    /// Fractional discount versus the on-demand reference, in `[0, 1]`.
    pub fn savings_ratio(&self) -> f64 {
        if self.on_demand <= 0.0 {
            return 0.0;
        }
        (1.0 - self.current / self.on_demand).clamp(0.0, 1.0)
    }
}

/// Sample standard deviation with the `n - 1` denominator.
///
/// Series shorter than two points have no spread and yield `0.0`.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_history_pads_with_oldest() {
        let s = PriceSample::from_history(0.05, 0.20, &[0.03, 0.04, 0.05], None, 0);
        assert_eq!(s.history.len(), HISTORY_LEN);
        assert_eq!(s.history[0], 0.03);
        assert_eq!(s.history[HISTORY_LEN - 3], 0.03);
        assert_eq!(*s.history.last().unwrap(), 0.05);
    }

    #[test]
    fn long_history_keeps_the_tail() {
        let raw: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let s = PriceSample::from_history(39.0, 50.0, &raw, None, 0);
        assert_eq!(s.history.len(), HISTORY_LEN);
        assert_eq!(s.history[0], (40 - HISTORY_LEN) as f64);
        assert_eq!(*s.history.last().unwrap(), 39.0);
    }

    #[test]
    fn last_entry_forced_to_current() {
        let s = PriceSample::from_history(0.09, 0.20, &[0.05, 0.06], None, 0);
        assert_eq!(*s.history.last().unwrap(), 0.09);
    }

    #[test]
    fn std_dev_uses_sample_denominator() {
        // var([1,2,3,4]) with n-1 = 5/3
        let sd = sample_std_dev(&[1.0, 2.0, 3.0, 4.0]);
        assert!((sd - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn std_dev_of_flat_or_tiny_series_is_zero() {
        assert_eq!(sample_std_dev(&[]), 0.0);
        assert_eq!(sample_std_dev(&[1.0]), 0.0);
        assert_eq!(sample_std_dev(&[2.0, 2.0, 2.0]), 0.0);
    }
}
