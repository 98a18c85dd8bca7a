//! Error types for the API client.

use thiserror::Error;

/// Transport-level failures produced by [`HttpClient`] backends.
///
/// [`HttpClient`]: crate::http_client::HttpClient
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Socket-level failure while connecting or transferring.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request was aborted by a cancellation handle.
    #[error("request canceled")]
    Canceled,

    /// Any other backend-specific error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors surfaced by container API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The container or path does not exist.
    #[error("not found")]
    NotFound,

    /// Unexpected status code, missing header, or undecodable payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request never completed at the transport level.
    #[error("transport error: {0}")]
    Transport(HttpClientError),

    /// The caller's cancellation handle fired.
    #[error("operation canceled")]
    Canceled,
}

impl From<HttpClientError> for ApiError {
    fn from(e: HttpClientError) -> Self {
        match e {
            HttpClientError::Canceled => Self::Canceled,
            other => Self::Transport(other),
        }
    }
}
