//! Trip pipeline shared by the server and the CLI
//!
//! Path in, trips out: optional resample, segmentation, then a displacement
//! filter that drops segments which never really went anywhere.

use crate::domain::{Path, TrajectoryError};
use crate::infra::{Config, Metrics};
use crate::services::segmentation::{segment_with_buckets, Segment, SegmentationConfig};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Knobs for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct TripSettings {
    pub segmentation: SegmentationConfig,
    /// Segments whose start-to-end displacement is not above this are dropped (km)
    pub min_trip_distance_km: f64,
    /// Resample the input at this interval before segmenting
    pub interpolate_secs: Option<f64>,
}

impl Default for TripSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for TripSettings {
    fn from(config: &Config) -> Self {
        Self {
            segmentation: config.segmentation(),
            min_trip_distance_km: config.min_trip_distance_km(),
            interpolate_secs: config.interpolate_secs(),
        }
    }
}

pub struct TripService {
    settings: TripSettings,
    metrics: Option<Arc<Metrics>>,
}

impl TripService {
    pub fn new(settings: TripSettings, metrics: Option<Arc<Metrics>>) -> Self {
        Self { settings, metrics }
    }

    pub fn settings(&self) -> &TripSettings {
        &self.settings
    }

    /// Segment a path and keep the segments that moved far enough
    pub fn segment(&self, path: Path) -> Result<Vec<Path>, TrajectoryError> {
        let started = Instant::now();
        let events_in = path.len();

        let path = match self.settings.interpolate_secs {
            Some(resolution) => {
                let resampled = path.interpolate(resolution)?;
                debug!(
                    events_in = %events_in,
                    events_out = %resampled.len(),
                    resolution_secs = %resolution,
                    "path_resampled"
                );
                resampled
            }
            None => path,
        };

        let segments = segment_with_buckets(path, &self.settings.segmentation);
        let segment_count = segments.len();

        let mut trips = Vec::new();
        for segment in segments {
            log_segment(&segment)?;
            // empty segments are never produced, so distance() cannot fail here
            if segment.path.distance()? > self.settings.min_trip_distance_km {
                trips.push(segment.path);
            }
        }

        let latency_us = started.elapsed().as_micros() as u64;
        if let Some(metrics) = &self.metrics {
            metrics.record_run(
                events_in as u64,
                segment_count as u64,
                trips.len() as u64,
                latency_us,
            );
        }

        info!(
            events = %events_in,
            segments = %segment_count,
            trips = %trips.len(),
            latency_us = %latency_us,
            "trips_segmented"
        );

        Ok(trips)
    }
}

fn log_segment(segment: &Segment) -> Result<(), TrajectoryError> {
    let path = &segment.path;
    debug!(
        kind = segment.kind().as_str(),
        events = %path.len(),
        start = %path.start()?.epoch,
        end = %path.end()?.epoch,
        duration_secs = %path.duration()?,
        distance_km = format!("{:.3}", path.distance()?),
        traveled_km = format!("{:.3}", path.distance_traveled()),
        avg_speed_kmh = format!("{:.1}", path.average_speed()?),
        "segment"
    );
    Ok(())
}
