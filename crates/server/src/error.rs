//! Error types for the MCP server.

use crate::capability::Capability;
use oapi_mcp_http_tools::HttpToolsError;
use oapi_mcp_openapi_tools::OpenApiToolsError;
use rmcp::ErrorData as McpError;
use serde_json::json;
use thiserror::Error;

/// Main error type for the server.
///
/// Load and gateway errors are fatal at startup; the rest are per-request and surface to the
/// MCP client as protocol errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// `OpenAPI` specs could not be loaded.
    #[error("failed to load OpenAPI specs: {0}")]
    Load(#[from] OpenApiToolsError),

    /// The HTTP gateway rejected its configuration.
    #[error(transparent)]
    Gateway(#[from] HttpToolsError),

    /// No tool/API pair is registered under the requested key.
    #[error("Tool ({key}) not found: {name}")]
    ToolNotFound { key: String, name: String },

    /// The downstream API returned an error or could not be reached.
    #[error("{0}")]
    DownstreamRequest(String),

    /// The server does not declare this capability.
    #[error("{0} not supported")]
    CapabilityNotSupported(Capability),

    #[error("Resource {0} not found")]
    ResourceNotFound(String),

    #[error("Prompt {0} not found")]
    PromptNotFound(String),

    /// The transport failed to initialize or terminated abnormally.
    #[error("transport error: {0}")]
    Transport(String),

    /// The credential store could not be read or written.
    #[error("credential store error: {0}")]
    Credentials(String),
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        let message = err.to_string();
        match err {
            ServerError::ToolNotFound { key, name } => {
                McpError::invalid_params(message, Some(json!({"key": key, "name": name})))
            }
            ServerError::CapabilityNotSupported(capability) => McpError::invalid_request(
                message,
                Some(json!({"capability": capability.as_str()})),
            ),
            ServerError::ResourceNotFound(uri) => {
                McpError::resource_not_found(message, Some(json!({"uri": uri})))
            }
            ServerError::PromptNotFound(_) => McpError::invalid_params(message, None),
            ServerError::DownstreamRequest(_)
            | ServerError::Load(_)
            | ServerError::Gateway(_)
            | ServerError::Transport(_)
            | ServerError::Credentials(_) => McpError::internal_error(message, None),
        }
    }
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
