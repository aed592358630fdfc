//! Domain models - the trajectory data model
//!
//! This module contains the canonical data types used throughout the system:
//! - `Event` - a single timestamped, located sample
//! - `EventRef` - an event viewed through its owning path (motion metrics)
//! - `Path` - a time-ordered collection of events
//! - `geodesy` - great-circle distance and bearing

pub mod event;
pub mod geodesy;
pub mod path;
pub mod types;

// Re-export commonly used types at module level
pub use event::{Event, EventRef};
pub use path::Path;
pub use types::{LatLng, TrajectoryError};
