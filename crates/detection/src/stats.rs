//! Shared statistical primitives
//!
//! Used by the volume tracker and the trade-size analyzer: plain
//! mean/std-dev/percentile over slices, Welford's online mean/variance for
//! unbounded streams, and a normal-approximation binomial confidence
//! interval for the calibrator's reliability curve.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0.0 for fewer than two samples.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Z-score of `value` against a baseline; 0.0 when the baseline has no spread.
pub fn z_score(value: f64, baseline_mean: f64, baseline_std: f64) -> f64 {
    if baseline_std <= 0.0 {
        return 0.0;
    }
    (value - baseline_mean) / baseline_std
}

/// Percentile (0.0..=1.0) by linear interpolation over a sorted copy.
/// 0.0 for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let p = p.clamp(0.0, 1.0);
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Fraction of samples strictly below `value` (0.0..=1.0); 0.0 when empty.
pub fn percentile_rank(values: &[f64], value: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let below = values.iter().filter(|&&v| v < value).count();
    below as f64 / values.len() as f64
}

/// Welford's online mean/variance, numerically stable for unbounded streams.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Welford {
    pub count: u64,
    pub mean: f64,
    m2: f64,
    pub min: f64,
    pub max: f64,
}

impl Welford {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Population variance; 0.0 for fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / self.count as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Bounded ring of recent samples for approximate percentile estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentReservoir {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl RecentReservoir {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn percentile(&self, p: f64) -> f64 {
        percentile(&self.as_slice(), p)
    }

    pub fn rank_of(&self, value: f64) -> f64 {
        percentile_rank(&self.as_slice(), value)
    }
}

/// Normal-approximation confidence interval for a binomial proportion.
/// `None` when there are no trials. z = 1.96 gives the usual 95% interval.
pub fn binomial_confidence_interval(successes: u64, trials: u64, z: f64) -> Option<(f64, f64)> {
    if trials == 0 {
        return None;
    }
    let n = trials as f64;
    let p = successes as f64 / n;
    let half = z * (p * (1.0 - p) / n).sqrt();
    Some(((p - half).max(0.0), (p + half).min(1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[2.0, 4.0, 6.0]), 4.0);
        assert_eq!(std_dev(&[5.0]), 0.0);
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_z_score_flat_baseline() {
        assert_eq!(z_score(500.0, 100.0, 0.0), 0.0);
        assert!((z_score(120.0, 100.0, 10.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = vec![10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&values, 0.0), 10.0);
        assert_eq!(percentile(&values, 1.0), 40.0);
        assert!((percentile(&values, 0.5) - 25.0).abs() < 1e-9);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_percentile_rank() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_rank(&values, 3.5), 0.75);
        assert_eq!(percentile_rank(&values, 0.5), 0.0);
        assert_eq!(percentile_rank(&[], 1.0), 0.0);
    }

    #[test]
    fn test_welford_matches_direct() {
        let values = [3.0, 7.0, 7.0, 19.0];
        let mut w = Welford::new();
        for v in values {
            w.push(v);
        }
        assert_eq!(w.count, 4);
        assert!((w.mean - mean(&values)).abs() < 1e-9);
        assert!((w.std_dev() - std_dev(&values)).abs() < 1e-9);
        assert_eq!(w.min, 3.0);
        assert_eq!(w.max, 19.0);
    }

    #[test]
    fn test_reservoir_evicts_oldest() {
        let mut r = RecentReservoir::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            r.push(v);
        }
        assert_eq!(r.len(), 3);
        assert_eq!(r.as_slice(), vec![2.0, 3.0, 4.0]);
        assert_eq!(r.rank_of(4.0), 2.0 / 3.0);
    }

    #[test]
    fn test_binomial_confidence_interval() {
        assert!(binomial_confidence_interval(0, 0, 1.96).is_none());
        let (lo, hi) = binomial_confidence_interval(50, 100, 1.96).unwrap();
        assert!(lo < 0.5 && hi > 0.5);
        assert!(lo >= 0.0 && hi <= 1.0);
    }
}
