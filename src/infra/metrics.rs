//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so concurrent request handlers never contend on a mutex.
//! `report()` is the only operation that resets anything (via atomic swap);
//! `snapshot()` reads cumulative values for scrapes and resets nothing.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Segmentation latency bucket boundaries (microseconds)
/// Buckets: ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, ≤25000, ≤50000, ≤100000, ≤250000, >250000
const BUCKET_BOUNDS: [u64; 10] =
    [250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000];
const NUM_BUCKETS: usize = 11;

/// Upper bound reported for each bucket (the overflow bucket uses 2x the last bound)
const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
    [250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000];

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].swap(0, Ordering::Relaxed))
}

/// Load all buckets without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Segmentation runs completed (monotonic)
    runs_total: AtomicU64,
    /// Requests rejected because of invalid input (monotonic)
    rejected_total: AtomicU64,
    /// Events ingested across all runs (monotonic)
    events_total: AtomicU64,
    /// Segments produced before filtering (monotonic)
    segments_total: AtomicU64,
    /// Trips returned after filtering (monotonic)
    trips_total: AtomicU64,
    /// Segments discarded by the displacement filter (monotonic)
    discarded_total: AtomicU64,
    /// Runs since last report (reset on report)
    runs_since_report: AtomicU64,
    /// Sum of run latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max run latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Run latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of all run latencies in microseconds (monotonic)
    latency_sum_total_us: AtomicU64,
    /// Run latency histogram buckets since start (monotonic)
    latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
            events_total: AtomicU64::new(0),
            segments_total: AtomicU64::new(0),
            trips_total: AtomicU64::new(0),
            discarded_total: AtomicU64::new(0),
            runs_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_total_us: AtomicU64::new(0),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed segmentation run (lock-free)
    #[inline]
    pub fn record_run(&self, events: u64, segments: u64, trips: u64, latency_us: u64) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        self.events_total.fetch_add(events, Ordering::Relaxed);
        self.segments_total.fetch_add(segments, Ordering::Relaxed);
        self.trips_total.fetch_add(trips, Ordering::Relaxed);
        self.discarded_total.fetch_add(segments.saturating_sub(trips), Ordering::Relaxed);

        self.runs_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);
        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    /// Record a request rejected for invalid input (lock-free)
    #[inline]
    pub fn record_rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn runs_total(&self) -> u64 {
        self.runs_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected_total(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn trips_total(&self) -> u64 {
        self.trips_total.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let runs_count = self.runs_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let runs_per_sec = if elapsed.as_secs_f64() > 0.0 {
            runs_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            runs_total: self.runs_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            events_total: self.events_total.load(Ordering::Relaxed),
            segments_total: self.segments_total.load(Ordering::Relaxed),
            trips_total: self.trips_total.load(Ordering::Relaxed),
            discarded_total: self.discarded_total.load(Ordering::Relaxed),
            runs_per_sec,
            avg_latency_us: if runs_count > 0 { latency_sum / runs_count } else { 0 },
            max_latency_us: max_latency,
            lat_sum_us: latency_sum,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
        }
    }
}

impl Metrics {
    /// Cumulative view for scrapes; leaves the periodic window untouched
    ///
    /// Histogram, sum and percentiles cover every run since start. Max and
    /// rate cover the current reporting window.
    pub fn snapshot(&self) -> MetricsSummary {
        let lat_buckets = load_buckets(&self.latency_buckets_total);
        let latency_sum = self.latency_sum_total_us.load(Ordering::Relaxed);
        let runs_total = self.runs_total.load(Ordering::Relaxed);

        let window_secs = self.last_report_time.lock().elapsed().as_secs_f64();
        let runs_per_sec = if window_secs > 0.0 {
            self.runs_since_report.load(Ordering::Relaxed) as f64 / window_secs
        } else {
            0.0
        };

        MetricsSummary {
            runs_total,
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            events_total: self.events_total.load(Ordering::Relaxed),
            segments_total: self.segments_total.load(Ordering::Relaxed),
            trips_total: self.trips_total.load(Ordering::Relaxed),
            discarded_total: self.discarded_total.load(Ordering::Relaxed),
            runs_per_sec,
            avg_latency_us: if runs_total > 0 { latency_sum / runs_total } else { 0 },
            max_latency_us: self.latency_max_us.load(Ordering::Relaxed),
            lat_sum_us: latency_sum,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub runs_total: u64,
    pub rejected_total: u64,
    pub events_total: u64,
    pub segments_total: u64,
    pub trips_total: u64,
    pub discarded_total: u64,
    pub runs_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Sum of latencies covered by `lat_buckets`
    pub lat_sum_us: u64,
    /// Run latency histogram buckets
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            runs_total = %self.runs_total,
            rejected_total = %self.rejected_total,
            runs_per_sec = format!("{:.2}", self.runs_per_sec),
            events_total = %self.events_total,
            trips_total = %self.trips_total,
            discarded_total = %self.discarded_total,
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
