//! Error types for `oapi-mcp-http-tools`.

use thiserror::Error;

/// Errors raised before any network call is made.
///
/// Downstream failures (non-2xx, transport errors) are not errors at this level; they are
/// reported as [`crate::HttpResult::Failure`].
#[derive(Debug, Error)]
pub enum HttpToolsError {
    /// The configured authorization cannot be turned into a request header set.
    #[error("Unsupported authorization type: {0}")]
    UnsupportedAuthorization(String),

    /// The HTTP method is not one of GET, POST, PUT, DELETE.
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// The underlying HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, HttpToolsError>;
