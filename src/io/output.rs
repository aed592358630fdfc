//! JSON shapes returned to clients
//!
//! ```json
//! {"trips": [{"events": [{"date": 1300000000.0, "location": [37.77, -122.41]}],
//!             "info": {"traveled": 1.25}}]}
//! ```

use crate::domain::{Event, Path};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventJson {
    /// Seconds since the Unix epoch
    pub date: f64,
    /// `[lat, lng]`
    pub location: [f64; 2],
}

impl From<&Event> for EventJson {
    fn from(event: &Event) -> Self {
        Self { date: event.epoch, location: event.location.as_array() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoJson {
    /// Start-to-end displacement in km (0 for an empty path)
    pub traveled: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathJson {
    pub events: Vec<EventJson>,
    pub info: InfoJson,
}

impl From<&Path> for PathJson {
    fn from(path: &Path) -> Self {
        Self {
            events: path.events().iter().map(EventJson::from).collect(),
            info: InfoJson { traveled: path.distance().unwrap_or(0.0) },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripsResponse {
    pub trips: Vec<PathJson>,
}

impl TripsResponse {
    pub fn from_paths(paths: &[Path]) -> Self {
        Self { trips: paths.iter().map(PathJson::from).collect() }
    }
}
