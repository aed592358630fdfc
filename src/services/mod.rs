//! Services - segmentation and the trip pipeline
//!
//! - `segmentation` - Dwell-signal segmentation of a path into trips and stays
//! - `trip_service` - Resample, segment and filter, shared by server and CLI

pub mod segmentation;
pub mod trip_service;

// Re-export commonly used types
pub use segmentation::{segment_trips, SegmentationConfig};
pub use trip_service::{TripService, TripSettings};
