//! Trip/stay segmentation of a path
//!
//! Every event gets a dwell signal (seconds spent nearby, see
//! `EventRef::time_near`). The signal is quantized into coarse buckets and
//! consecutive events sharing a bucket form one segment. Long dwell buckets
//! are stays, the zero bucket is movement.

use crate::domain::{Event, Path};

/// Radius that counts as "nearby" for the dwell signal (km)
pub const DEFAULT_NEAR_THRESHOLD_KM: f64 = 0.1;
/// Width of a dwell bucket in seconds
pub const DEFAULT_BUCKET_SECS: f64 = 1000.0;

/// Tunable thresholds for segmentation
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    pub near_threshold_km: f64,
    pub bucket_secs: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self { near_threshold_km: DEFAULT_NEAR_THRESHOLD_KM, bucket_secs: DEFAULT_BUCKET_SECS }
    }
}

impl SegmentationConfig {
    /// Quantized dwell bucket, in seconds, for a signal value
    #[inline]
    pub fn bucket(&self, signal_secs: f64) -> f64 {
        (signal_secs / self.bucket_secs).floor() * self.bucket_secs
    }
}

/// Whether a segment was spent moving or lingering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Trip,
    Stay,
}

impl SegmentKind {
    #[inline]
    pub fn from_bucket(bucket_secs: f64) -> Self {
        if bucket_secs > 0.0 {
            SegmentKind::Stay
        } else {
            SegmentKind::Trip
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Trip => "trip",
            SegmentKind::Stay => "stay",
        }
    }
}

/// A segment produced by `segment_with_buckets`
#[derive(Debug, Clone)]
pub struct Segment {
    pub path: Path,
    /// Dwell bucket shared by every event in the segment (seconds)
    pub bucket_secs: f64,
}

impl Segment {
    #[inline]
    pub fn kind(&self) -> SegmentKind {
        SegmentKind::from_bucket(self.bucket_secs)
    }
}

/// Dwell signal for every event of the path, in path order
pub fn dwell_signals(path: &Path, near_threshold_km: f64) -> Vec<f64> {
    path.iter_refs().map(|e| e.time_near(near_threshold_km)).collect()
}

/// Split a path into contiguous trip/stay segments, keeping their buckets
///
/// Consumes the path: each event moves into exactly one segment, and the
/// segments concatenated in order reproduce the original sequence.
pub fn segment_with_buckets(path: Path, config: &SegmentationConfig) -> Vec<Segment> {
    let buckets: Vec<f64> = dwell_signals(&path, config.near_threshold_km)
        .into_iter()
        .map(|signal| config.bucket(signal))
        .collect();

    let mut segments = Vec::new();
    let mut current: Vec<Event> = Vec::new();
    let mut current_bucket = None;

    for (event, bucket) in path.into_events().into_iter().zip(buckets) {
        if current_bucket.is_some_and(|b| b != bucket) {
            segments.push(Segment {
                path: Path::from_events(std::mem::take(&mut current)),
                bucket_secs: current_bucket.unwrap_or_default(),
            });
        }
        current_bucket = Some(bucket);
        current.push(event);
    }

    if let Some(bucket_secs) = current_bucket {
        segments.push(Segment { path: Path::from_events(current), bucket_secs });
    }

    segments
}

/// Split a path into contiguous sub-paths of similar dwell time
pub fn segment_trips(path: Path, config: &SegmentationConfig) -> Vec<Path> {
    segment_with_buckets(path, config).into_iter().map(|s| s.path).collect()
}
