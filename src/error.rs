//! Error type shared by the loader, the aggregator and the lookup layer.

use thiserror::Error;

/// Everything that can go wrong while turning a movement report into a
/// monthly summary.
///
/// Only [`MetricsError::InvalidConfiguration`] is fatal to a run.
/// `MalformedRecord` and `LookupUnavailable` are recorded and the pipeline
/// carries on with partial data.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A report row or trip could not be interpreted and was skipped.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The speed-limit service could not answer for a segment.
    #[error("speed-limit lookup unavailable: {0}")]
    LookupUnavailable(String),

    /// The aggregator configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        MetricsError::MalformedRecord(reason.into())
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        MetricsError::InvalidConfiguration(reason.into())
    }
}
