//! Error types for `oapi-mcp-openapi-tools`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading `OpenAPI` documents.
///
/// Compilation itself never fails: malformed operations degrade to defaults.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// A directory or file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document is not valid JSON/YAML or not a valid `OpenAPI` 3.0 document.
    #[error("failed to parse OpenAPI document '{location}': {message}")]
    Parse { location: String, message: String },

    /// A `$ref` could not be resolved.
    #[error("unresolved $ref: {0}")]
    Reference(String),
}

impl OpenApiToolsError {
    pub(crate) fn parse(location: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            location: location.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
