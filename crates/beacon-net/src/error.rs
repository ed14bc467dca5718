//! Network error types.

use thiserror::Error;

/// Network error type.
#[derive(Error, Debug)]
pub enum NetError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL construction error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid request component
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using NetError.
pub type NetResult<T> = Result<T, NetError>;
