//! Aggregate statistics over latency and throughput samples.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    pub std_dev: f64,
    pub jitter: f64,
    pub count: usize,
}

impl Summary {
    /// Summarizes `samples` in arrival order.
    ///
    /// Median is the lower median for even counts; standard deviation is the
    /// sample (n - 1) deviation; jitter is the sum of absolute differences
    /// between consecutive samples divided by the sample count. An empty input
    /// yields all zeros.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                avg: 0.0,
                median: 0.0,
                std_dev: 0.0,
                jitter: 0.0,
                count: 0,
            };
        }

        let count = samples.len();
        let n = count as f64;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = samples.iter().sum::<f64>() / n;

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            sorted[count / 2 - 1]
        };

        let std_dev = if count == 1 {
            0.0
        } else {
            let sum_sq: f64 = samples.iter().map(|s| (s - avg) * (s - avg)).sum();
            (sum_sq / (n - 1.0)).sqrt()
        };

        let jitter = samples
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .sum::<f64>()
            / n;

        Self {
            min,
            max,
            avg,
            median,
            std_dev,
            jitter,
            count,
        }
    }
}
