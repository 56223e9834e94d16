//! Aggregated kernel timings over repeated dispatches.

use hdrhistogram::Histogram;
use std::time::Duration;

/// Highest trackable kernel time: one hour, in nanoseconds.
const MAX_TRACKABLE_NS: u64 = 3_600_000_000_000;

/// Histogram of kernel execution times.
#[derive(Debug, Clone)]
pub struct TimingStats {
    histogram: Histogram<u64>,
    total: Duration,
}

impl TimingStats {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKABLE_NS, 3)
            .expect("histogram bounds are valid");
        Self {
            histogram,
            total: Duration::ZERO,
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        let ns = (elapsed.as_nanos() as u64).clamp(1, MAX_TRACKABLE_NS);
        let _ = self.histogram.record(ns);
        self.total += elapsed;
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn summary(&self) -> TimingSummary {
        if self.histogram.is_empty() {
            return TimingSummary::default();
        }

        let ms = |ns: u64| ns as f64 / 1_000_000.0;
        TimingSummary {
            iterations: self.histogram.len(),
            min_ms: ms(self.histogram.min()),
            mean_ms: self.histogram.mean() / 1_000_000.0,
            p50_ms: ms(self.histogram.value_at_quantile(0.50)),
            p99_ms: ms(self.histogram.value_at_quantile(0.99)),
            max_ms: ms(self.histogram.max()),
        }
    }
}

impl Default for TimingStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`TimingStats`], in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct TimingSummary {
    pub iterations: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}
