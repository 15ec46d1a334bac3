//! Percentile aggregation
//!
//! Nearest-rank percentiles and summary statistics over unordered samples.
//! Empty input is not an error: every statistic falls back to `0.0`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Duration as fractional milliseconds, computed from integer nanoseconds
pub fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Nearest-rank percentile of `samples`, with `p` in `0..=100`.
///
/// Sorts ascending, picks rank `ceil(n * p / 100)` clamped to `[1, n]`.
/// Returns `0.0` for an empty sample set.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    nearest_rank(&sorted, p)
}

/// Arithmetic mean, `0.0` for an empty sample set.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let rank = (n as f64 * p.clamp(0.0, 100.0) / 100.0).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Summary statistics for one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Summary {
    /// Summarize a sample set. Input order does not matter.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        Self {
            count: sorted.len(),
            mean: mean(&sorted),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: nearest_rank(&sorted, 50.0),
            p90: nearest_rank(&sorted, 90.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
