//! Prometheus text exposition of the trip metrics
//!
//! Served by the trip server at /metrics.

use crate::infra::metrics::{
    Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS,
};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge)
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Write a gauge metric with f64 value
fn write_gauge_f64(output: &mut String, name: &str, help: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name} {val:.6}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {count}");
}

/// Format metrics in Prometheus text exposition format
///
/// Reads a snapshot, so scrapes never reset the periodic log report and the
/// histogram stays cumulative.
pub fn format_prometheus_metrics(metrics: &Metrics) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(2048);

    write_counters(&mut output, &summary);
    write_latency(&mut output, &summary);

    output
}

fn write_counters(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "trips_requests_total",
        "Segmentation runs completed",
        MetricType::Counter,
        summary.runs_total,
    );
    write_metric(
        output,
        "trips_requests_rejected_total",
        "Requests rejected for invalid input",
        MetricType::Counter,
        summary.rejected_total,
    );
    write_metric(
        output,
        "trips_events_ingested_total",
        "Location events ingested",
        MetricType::Counter,
        summary.events_total,
    );
    write_metric(
        output,
        "trips_segments_total",
        "Segments produced before filtering",
        MetricType::Counter,
        summary.segments_total,
    );
    write_metric(
        output,
        "trips_emitted_total",
        "Trips returned to clients",
        MetricType::Counter,
        summary.trips_total,
    );
    write_metric(
        output,
        "trips_segments_discarded_total",
        "Segments dropped by the displacement filter",
        MetricType::Counter,
        summary.discarded_total,
    );
    write_gauge_f64(
        output,
        "trips_requests_per_sec",
        "Segmentation runs per second since last report",
        summary.runs_per_sec,
    );
}

fn write_latency(output: &mut String, summary: &MetricsSummary) {
    write_histogram(
        output,
        "trips_segmentation_latency_us",
        "Segmentation run latency in microseconds",
        &summary.lat_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.lat_sum_us,
    );
    write_metric(
        output,
        "trips_segmentation_latency_max_us",
        "Max segmentation latency since last report",
        MetricType::Gauge,
        summary.max_latency_us,
    );
    write_metric(
        output,
        "trips_segmentation_latency_p99_us",
        "p99 segmentation latency since start",
        MetricType::Gauge,
        summary.lat_p99_us,
    );
}
