//! HTTP semantics helpers.
//!
//! Used to derive MCP `ToolAnnotations` for compiled tools from the method of their backing call.

use crate::api::HttpMethod;
use rmcp::model::ToolAnnotations;

/// Tool annotations for an HTTP-backed tool.
///
/// `openWorldHint` is always `true`: every compiled tool talks to a remote API.
#[must_use]
pub fn annotations_for_method(method: HttpMethod) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = match method {
        HttpMethod::Get => (true, false, true),
        HttpMethod::Post => (false, false, false),
        HttpMethod::Put | HttpMethod::Delete => (false, true, true),
    };

    ToolAnnotations {
        title: None,
        read_only_hint: Some(read_only),
        destructive_hint: Some(destructive),
        idempotent_hint: Some(idempotent),
        open_world_hint: Some(true),
    }
}
