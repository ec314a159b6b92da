use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::summary::LatencySummary;
use crate::sample::{Sample, StatsBatch};

// ─── Configuration ───────────────────────────────────────────────

/// How many individual samples we keep for the live feed
const MAX_RECENT_SAMPLES: usize = 200;

/// Distinct urls tracked individually; the rest share one bucket
const MAX_TRACKED_URLS: usize = 256;
const OTHER_URLS: &str = "(other)";

/// Aggregate timeline resolution (one point per window)
const TIMELINE_WINDOW_MS: u64 = 1_000;

/// HdrHistogram range: 1 ms → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe aggregation of everything POSTed to the collection endpoint.
/// The ingest handler calls `record_batch()`, the SSE stream `snapshot()`.
pub struct StatsCollector {
    inner: Mutex<Inner>,
}

/// A single entry in the live sample feed.
#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    pub received_at: DateTime<Utc>,
    pub url: String,
    pub duration_ms: u64,
}

/// Per-url latency breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct UrlSummary {
    pub url: String,
    pub latency: LatencySummary,
}

/// One aggregated point on the timeline chart.
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub timestamp_ms: u64,
    pub avg_duration_ms: f64,
    pub count: u64,
}

/// A bucket in the latency distribution histogram.
#[derive(Debug, Clone, Serialize)]
pub struct DistBucket {
    pub range_start_ms: u64,
    pub range_end_ms: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub overall: LatencySummary,
    /// Busiest first.
    pub urls: Vec<UrlSummary>,

    pub total_samples: u64,
    pub total_batches: u64,
    /// Entries skipped because they carried no url.
    pub rejected_samples: u64,
    pub samples_per_sec: f64,
    pub elapsed_secs: f64,

    pub recent_samples: Vec<SampleRecord>,
    pub timeline: Vec<TimelinePoint>,
    pub distribution: Vec<DistBucket>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    overall_hist: Histogram<u64>,
    url_hists: HashMap<String, Histogram<u64>>,

    total_samples: u64,
    total_batches: u64,
    rejected_samples: u64,

    recent_samples: VecDeque<SampleRecord>,

    timeline: Vec<TimelinePoint>,
    current_window: Option<WindowAccumulator>,

    // Anchor for elapsed time, set by the first batch
    start_time: Option<Instant>,
}

struct WindowAccumulator {
    window_start_ms: u64,
    duration_sum: u64,
    count: u64,
}

impl WindowAccumulator {
    fn point(&self) -> TimelinePoint {
        TimelinePoint {
            timestamp_ms: self.window_start_ms,
            avg_duration_ms: self.duration_sum as f64 / self.count as f64,
            count: self.count,
        }
    }
}

fn new_histogram() -> Histogram<u64> {
    // Bounds are constants known to be valid.
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram bounds")
}

// ─── StatsCollector impl ─────────────────────────────────────────

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Aggregate one flushed batch. Entries with an empty url are skipped;
    /// returns how many were.
    pub fn record_batch(&self, batch: &StatsBatch) -> usize {
        let mut inner = self.inner.lock();
        inner.total_batches += 1;
        let mut rejected = 0;
        for sample in &batch.stats {
            if sample.url().is_empty() {
                rejected += 1;
                continue;
            }
            inner.record(sample);
        }
        inner.rejected_samples += rejected as u64;
        rejected
    }

    /// Wipe all data; called when a new load run starts.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            overall_hist: new_histogram(),
            url_hists: HashMap::new(),
            total_samples: 0,
            total_batches: 0,
            rejected_samples: 0,
            recent_samples: VecDeque::with_capacity(MAX_RECENT_SAMPLES + 1),
            timeline: Vec::with_capacity(1024),
            current_window: None,
            start_time: None,
        }
    }

    fn record(&mut self, sample: &Sample) {
        let start = *self.start_time.get_or_insert_with(Instant::now);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let duration_ms = sample.duration_ms();

        self.total_samples += 1;
        self.overall_hist.saturating_record(duration_ms);

        let key = if self.url_hists.contains_key(sample.url())
            || self.url_hists.len() < MAX_TRACKED_URLS
        {
            sample.url()
        } else {
            OTHER_URLS
        };
        self.url_hists
            .entry(key.to_owned())
            .or_insert_with(new_histogram)
            .saturating_record(duration_ms);

        self.push_to_timeline(elapsed_ms, duration_ms);

        self.recent_samples.push_back(SampleRecord {
            received_at: Utc::now(),
            url: sample.url().to_owned(),
            duration_ms,
        });
        if self.recent_samples.len() > MAX_RECENT_SAMPLES {
            self.recent_samples.pop_front();
        }
    }

    /// Bucket the sample into the current window, or roll over.
    fn push_to_timeline(&mut self, elapsed_ms: u64, duration_ms: u64) {
        let window_start = (elapsed_ms / TIMELINE_WINDOW_MS) * TIMELINE_WINDOW_MS;

        match &mut self.current_window {
            Some(w) if w.window_start_ms == window_start => {
                w.duration_sum += duration_ms;
                w.count += 1;
            }
            _ => {
                if let Some(old) = self.current_window.take() {
                    self.timeline.push(old.point());
                }
                self.current_window = Some(WindowAccumulator {
                    window_start_ms: window_start,
                    duration_sum: duration_ms,
                    count: 1,
                });
            }
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let samples_per_sec = if elapsed_secs > 0.0 {
            self.total_samples as f64 / elapsed_secs
        } else {
            0.0
        };

        // Include the current (partial) window
        let mut timeline = self.timeline.clone();
        timeline.extend(self.current_window.as_ref().map(WindowAccumulator::point));

        let mut urls: Vec<UrlSummary> = self
            .url_hists
            .iter()
            .map(|(url, hist)| UrlSummary {
                url: url.clone(),
                latency: LatencySummary::from_histogram(hist),
            })
            .collect();
        urls.sort_by(|a, b| {
            b.latency
                .count
                .cmp(&a.latency.count)
                .then_with(|| a.url.cmp(&b.url))
        });

        StatsSnapshot {
            overall: LatencySummary::from_histogram(&self.overall_hist),
            urls,
            total_samples: self.total_samples,
            total_batches: self.total_batches,
            rejected_samples: self.rejected_samples,
            samples_per_sec,
            elapsed_secs,
            recent_samples: self.recent_samples.iter().cloned().collect(),
            timeline,
            distribution: Self::compute_distribution(&self.overall_hist),
        }
    }

    /// Bucket boundaries (ms) for the distribution bar chart.
    const DIST_BOUNDARIES: &'static [u64] = &[
        5, 10, 25, 50, 100, 200, 300, 500, 750, 1_000, 2_000, 5_000, 10_000,
    ];

    fn compute_distribution(hist: &Histogram<u64>) -> Vec<DistBucket> {
        if hist.len() == 0 {
            return Vec::new();
        }

        let bounds = Self::DIST_BOUNDARIES;
        let mut counts = vec![0u64; bounds.len() + 1]; // +1 for overflow

        for iv in hist.iter_recorded() {
            let val = iv.value_iterated_to();
            let idx = match bounds.binary_search(&val) {
                Ok(i) | Err(i) => i,
            };
            counts[idx] += iv.count_at_value();
        }

        let mut result = Vec::with_capacity(counts.len());
        let mut prev = 0u64;
        for (&boundary, &count) in bounds.iter().zip(&counts) {
            if count > 0 {
                result.push(DistBucket {
                    range_start_ms: prev,
                    range_end_ms: boundary,
                    count,
                });
            }
            prev = boundary;
        }
        let overflow = counts[bounds.len()];
        if overflow > 0 {
            result.push(DistBucket {
                range_start_ms: prev,
                range_end_ms: hist.max(),
                count: overflow,
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(samples: &[(&str, u64)]) -> StatsBatch {
        StatsBatch::new(samples.iter().map(|&(u, d)| Sample::new(u, d)).collect())
    }

    #[test]
    fn empty_collector_snapshot_is_zeroed() {
        let snap = StatsCollector::new().snapshot();
        assert_eq!(snap.total_samples, 0);
        assert_eq!(snap.total_batches, 0);
        assert_eq!(snap.overall, LatencySummary::default());
        assert!(snap.urls.is_empty());
        assert!(snap.distribution.is_empty());
        assert!(snap.timeline.is_empty());
    }

    #[test]
    fn batches_aggregate_per_url() {
        let collector = StatsCollector::new();
        collector.record_batch(&batch(&[("/a", 10), ("/b", 40), ("/a", 30)]));
        collector.record_batch(&batch(&[("/a", 20)]));

        let snap = collector.snapshot();
        assert_eq!(snap.total_batches, 2);
        assert_eq!(snap.total_samples, 4);
        assert_eq!(snap.overall.min_ms, 10);
        assert_eq!(snap.overall.max_ms, 40);

        assert_eq!(snap.urls[0].url, "/a");
        assert_eq!(snap.urls[0].latency.count, 3);
        assert_eq!(snap.urls[1].url, "/b");
        assert_eq!(snap.urls[1].latency.count, 1);

        let feed: Vec<_> = snap.recent_samples.iter().map(|r| (r.url.as_str(), r.duration_ms)).collect();
        assert_eq!(feed, vec![("/a", 10), ("/b", 40), ("/a", 30), ("/a", 20)]);
    }

    #[test]
    fn entries_without_url_are_skipped_and_counted() {
        let collector = StatsCollector::new();
        let rejected = collector.record_batch(&batch(&[("/ok", 5), ("", 7), ("/ok", 9)]));
        assert_eq!(rejected, 1);

        let snap = collector.snapshot();
        assert_eq!(snap.total_batches, 1);
        assert_eq!(snap.total_samples, 2);
        assert_eq!(snap.rejected_samples, 1);
        assert_eq!(snap.urls.len(), 1);
        assert_eq!(snap.urls[0].url, "/ok");
    }

    #[test]
    fn zero_duration_is_counted() {
        let collector = StatsCollector::new();
        collector.record_batch(&batch(&[("/fast", 0)]));
        let snap = collector.snapshot();
        assert_eq!(snap.overall.count, 1);
        assert_eq!(snap.overall.min_ms, 0);
        assert_eq!(snap.distribution[0].range_start_ms, 0);
        assert_eq!(snap.distribution[0].count, 1);
    }

    #[test]
    fn recent_feed_is_bounded() {
        let collector = StatsCollector::new();
        for i in 0..(MAX_RECENT_SAMPLES as u64 + 10) {
            collector.record_batch(&batch(&[("/x", i)]));
        }
        let snap = collector.snapshot();
        assert_eq!(snap.recent_samples.len(), MAX_RECENT_SAMPLES);
        assert_eq!(snap.recent_samples[0].duration_ms, 10);
    }

    #[test]
    fn url_cardinality_is_capped() {
        let collector = StatsCollector::new();
        for i in 0..(MAX_TRACKED_URLS + 5) {
            collector.record_batch(&batch(&[(format!("/u/{i}").as_str(), 1)]));
        }
        let snap = collector.snapshot();
        assert_eq!(snap.urls.len(), MAX_TRACKED_URLS + 1);
        let other = snap.urls.iter().find(|u| u.url == OTHER_URLS).unwrap();
        assert_eq!(other.latency.count, 5);
    }

    #[test]
    fn reset_clears_everything() {
        let collector = StatsCollector::new();
        collector.record_batch(&batch(&[("/a", 10)]));
        collector.reset();
        assert_eq!(collector.snapshot().total_samples, 0);
    }
}
