//! Outbound HTTP gateway for OpenAPI-backed MCP tools.
//!
//! This crate is intended to be used by:
//! - `oapi-mcp-openapi-tools` (API descriptors produced by the tool compiler)
//! - `oapi-mcp-server` (request dispatch for `tools/call`)
//!
//! It intentionally knows nothing about `OpenAPI` documents or the MCP server lifecycle.

pub mod api;
pub mod config;
pub mod error;
pub mod form;
pub mod gateway;
pub mod semantics;

pub use api::{ApiDescriptor, ContentType, HttpMethod};
pub use config::{Authorization, GatewayConfig};
pub use error::{HttpToolsError, Result};
pub use gateway::{HttpGateway, HttpResult, RequestPayload, interpolate_url};
