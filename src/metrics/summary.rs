use hdrhistogram::Histogram;
use serde::Serialize;

/// Latency breakdown for one population of samples, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
}

impl LatencySummary {
    /// All-zero when the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::default();
        }

        Self {
            count: hist.len(),
            min_ms: hist.min(),
            max_ms: hist.max(),
            mean_ms: hist.mean(),
            p50_ms: hist.value_at_quantile(0.50),
            p90_ms: hist.value_at_quantile(0.90),
            p99_ms: hist.value_at_quantile(0.99),
        }
    }
}
