//! Pipeline error types.

use thiserror::Error;

/// Pipeline error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Persistence error
    #[error("Store error: {0}")]
    Store(#[from] beacon_store::StoreError),

    /// Network error
    #[error("Network error: {0}")]
    Net(#[from] beacon_net::NetError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event cannot be turned into a hit
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;
