//! IO modules - external system interfaces
//!
//! - `latitude` - Google Latitude JSON feed ingestion
//! - `kml` - KML `gx:Track` ingestion
//! - `output` - Trips JSON response shapes
//! - `prometheus` - Prometheus text formatting of metrics
//! - `http` - Trip HTTP server

pub mod error;
pub mod http;
pub mod kml;
pub mod latitude;
pub mod output;
pub mod prometheus;

// Re-export commonly used types
pub use error::IngestError;
pub use http::{start_server, AppState};
pub use kml::parse_kml;
pub use latitude::parse_feed;
pub use output::{PathJson, TripsResponse};
