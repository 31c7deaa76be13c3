//! Upstream bookmark API error types.

use std::sync::Arc;

use tidemark_core::Error;

/// Errors from the upstream bookmark API client.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// No API token configured.
    #[error("missing API token: TIDEMARK_UPSTREAM_API_TOKEN not set")]
    MissingToken,

    /// Invalid page request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed (invalid or revoked token).
    #[error("authentication failed: token rejected")]
    AuthError,

    /// Rate limited by the upstream API.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// A page request exceeded its timeout.
    #[error("request timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// The API handed back a cursor it already returned.
    #[error("pagination loop: cursor {0} repeated")]
    PaginationLoop(String),

    /// An asset response was unusable.
    #[error("asset {id}: {reason}")]
    Asset { id: String, reason: String },
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Network(Arc::new(err))
    }
}

impl From<UpstreamError> for Error {
    fn from(err: UpstreamError) -> Self {
        let message = err.to_string();
        match err {
            UpstreamError::MissingToken | UpstreamError::AuthError => Error::UpstreamAuth(message),
            UpstreamError::RateLimited => Error::UpstreamRateLimited(message),
            UpstreamError::Timeout(_) => Error::UpstreamTimeout(message),
            UpstreamError::Parse(_) | UpstreamError::PaginationLoop(_) => Error::Validation(message),
            UpstreamError::Asset { .. } => Error::ImageFetch(message),
            UpstreamError::InvalidRequest(_) => Error::InvalidInput(message),
            UpstreamError::HttpError { .. } | UpstreamError::Network(_) => Error::Upstream(message),
        }
    }
}
