//! Shared types for the trajectory model

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[inline]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check that both coordinates are finite and inside their valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Coordinate pair in `[lat, lng]` order, as emitted on the wire
    #[inline]
    pub fn as_array(&self) -> [f64; 2] {
        [self.lat, self.lng]
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Errors raised by path and event operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrajectoryError {
    #[error("path has no events")]
    EmptyPath,

    #[error("neighbor offset {offset} from index {index} is outside a path of {len} events")]
    OutOfRange { index: usize, offset: isize, len: usize },

    #[error("operation needs at least {needed} events, path has {found}")]
    InsufficientEvents { needed: usize, found: usize },

    #[error("cannot interpolate at {epoch}: bracketing events share the same timestamp")]
    DegenerateBracket { epoch: f64 },

    #[error("resolution must be a positive number of seconds, got {0}")]
    InvalidResolution(f64),

    #[error("event is not attached to this path")]
    Detached,

    #[error("inserting event at {epoch} into index {index} would break time order")]
    OutOfOrder { index: usize, epoch: f64 },

    #[error("index {index} is outside a path of {len} events")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("epoch must be a finite number of seconds, got {0}")]
    InvalidEpoch(f64),

    #[error("resampling would produce {requested} events, limit is {max}")]
    TooManySamples { requested: f64, max: usize },
}

pub type Result<T> = std::result::Result<T, TrajectoryError>;
