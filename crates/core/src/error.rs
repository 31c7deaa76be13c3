//! Unified error types for tidemark.
//!
//! Display strings carry a stable code prefix so log lines and MCP error
//! messages can be grepped by category.

use std::sync::Arc;

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error type for the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., page 0).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No data of any kind is available for the request.
    #[error("NO_DATA: {0}")]
    NoData(String),

    /// SQLite object store operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Remote object store returned an error or could not be reached.
    #[error("STORE_ERROR: {0}")]
    Store(String),

    /// Writing a persisted record failed; the write operation was aborted.
    #[error("PERSIST_FAILED: {key}: {reason}")]
    PersistFailed { key: String, reason: String },

    /// A stored record could not be encoded or decoded.
    #[error("SERIALIZATION: {0}")]
    Serialization(String),

    /// A freshly fetched collection failed shape checks.
    #[error("VALIDATION_FAILED: {0}")]
    Validation(String),

    /// Lock manager failure other than plain contention.
    #[error("LOCK_ERROR: {0}")]
    Lock(String),

    /// Upstream API rejected the credentials.
    #[error("UPSTREAM_AUTH: {0}")]
    UpstreamAuth(String),

    /// Upstream API rate limited the request.
    #[error("UPSTREAM_RATE_LIMITED: {0}")]
    UpstreamRateLimited(String),

    /// An upstream page fetch exceeded its timeout.
    #[error("UPSTREAM_TIMEOUT: {0}")]
    UpstreamTimeout(String),

    /// Upstream API returned an error status or could not be reached.
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Private/internal address not allowed for image fetches.
    #[error("SSRF_BLOCKED: {0}")]
    SsrfBlocked(String),

    /// Fetching an image failed.
    #[error("IMAGE_FETCH_FAILED: {0}")]
    ImageFetch(String),

    /// Fetched payload was not an acceptable image.
    #[error("IMAGE_REJECTED: {0}")]
    ImageRejected(String),

    /// The same failure handed to every waiter of a coalesced operation.
    #[error("{0}")]
    Shared(Arc<Error>),
}

impl Error {
    /// Whether the error came from the upstream API rather than local state.
    pub fn is_upstream(&self) -> bool {
        match self {
            Error::UpstreamAuth(_) | Error::UpstreamRateLimited(_) | Error::UpstreamTimeout(_) | Error::Upstream(_) => {
                true
            }
            Error::Shared(inner) => inner.is_upstream(),
            _ => false,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) | Error::InvalidUrl(_) => -32602,
            Error::NoData(_) => -32001,
            Error::Database(_) | Error::MigrationFailed(_) | Error::Store(_) => -32002,
            Error::PersistFailed { .. } => -32003,
            Error::Serialization(_) => -32004,
            Error::Validation(_) => -32005,
            Error::Lock(_) => -32006,
            Error::UpstreamAuth(_) => -32007,
            Error::UpstreamRateLimited(_) => -32008,
            Error::UpstreamTimeout(_) => -32009,
            Error::Upstream(_) => -32010,
            Error::SsrfBlocked(_) | Error::ImageFetch(_) | Error::ImageRejected(_) => -32011,
            Error::Shared(inner) => inner.code(),
        }
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        McpError { code: ErrorCode(err.code()), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PersistFailed { key: "bookmarks/index.json".into(), reason: "503".into() };
        assert!(err.to_string().starts_with("PERSIST_FAILED"));
        assert!(err.to_string().contains("bookmarks/index.json"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::NoData("collection".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);
    }

    #[test]
    fn test_shared_error_keeps_message() {
        let inner = Arc::new(Error::UpstreamTimeout("page 3".into()));
        let err = Error::Shared(inner);
        assert!(err.is_upstream());
        assert_eq!(err.to_string(), "UPSTREAM_TIMEOUT: page 3");
        assert_eq!(McpError::from(err).code.0, -32009);
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: Result<u32, _> = serde_json::from_str("not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
