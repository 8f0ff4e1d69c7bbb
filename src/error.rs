//! Error types for Gluco Flux

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse reading payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    #[error("Invalid target range: {0}")]
    InvalidTargetRange(String),

    #[error("Readings mix units: expected {expected}, found {found}")]
    MixedUnits { expected: String, found: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] crate::config::ConfigError),

    #[error("Clustering failed: {0}")]
    ClusteringFailed(String),

    #[error("Outlier detection failed: {0}")]
    OutlierDetectionFailed(String),
}
