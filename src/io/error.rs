use crate::domain::TrajectoryError;

/// Errors raised while turning an external payload into a path
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid timestamp {value:?}: {reason}")]
    InvalidTime { value: String, reason: String },

    #[error("Invalid coordinate {0:?}")]
    InvalidCoordinate(String),

    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
