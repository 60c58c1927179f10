//! Server customization points.
//!
//! A [`ServerHooks`] implementation is injected into the server at construction. It may inject
//! derived fields into request bodies, rewrite responses, and register tools, resources and
//! prompts once the catalog has been compiled.

use crate::additional::{AdditionalTool, AdditionalToolHandler};
use crate::capability::{Capability, CapabilitySet};
use crate::error::{Result, ServerError};
use async_trait::async_trait;
use oapi_mcp_http_tools::ApiDescriptor;
use oapi_mcp_openapi_tools::{Catalog, ToolDefinition, ToolFilters};
use rmcp::model::{
    CallToolResult, GetPromptResult, JsonObject, Prompt, ReadResourceResult, Resource,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait ServerHooks: Send + Sync {
    /// Called once per load, after compilation and after pre-registered additional tools are
    /// merged.
    async fn extend_capabilities(&self, _registry: &mut CapabilityRegistry<'_>) -> Result<()> {
        Ok(())
    }

    /// Rewrite the caller's arguments before the request is made.
    fn prepare_body(
        &self,
        _tool: &ToolDefinition,
        _api: &ApiDescriptor,
        body: JsonObject,
    ) -> JsonObject {
        body
    }

    /// Rewrite the protocol response. `data` is the parsed downstream body.
    fn prepare_response(
        &self,
        _tool: &ToolDefinition,
        _api: &ApiDescriptor,
        _data: &Value,
        response: CallToolResult,
    ) -> CallToolResult {
        response
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        Err(ServerError::ResourceNotFound(uri.to_string()))
    }

    async fn get_prompt(
        &self,
        name: &str,
        _arguments: Option<&JsonObject>,
    ) -> Result<GetPromptResult> {
        Err(ServerError::PromptNotFound(name.to_string()))
    }
}

/// No-op hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ServerHooks for DefaultHooks {}

pub(crate) type HandlerMap = HashMap<String, Arc<dyn AdditionalToolHandler>>;

/// Mutable view of server state handed to [`ServerHooks::extend_capabilities`].
pub struct CapabilityRegistry<'a> {
    pub(crate) catalog: &'a mut Catalog,
    pub(crate) handlers: &'a mut HandlerMap,
    pub(crate) resources: &'a mut Vec<Resource>,
    pub(crate) prompts: &'a mut Vec<Prompt>,
    pub(crate) filters: &'a ToolFilters,
    pub(crate) capabilities: &'a CapabilitySet,
}

impl CapabilityRegistry<'_> {
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// Compiled tools may be adjusted in place (descriptions, required fields).
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        self.catalog
    }

    #[must_use]
    pub fn filters(&self) -> &ToolFilters {
        self.filters
    }

    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Merge an additional tool into the catalog if its filter predicate passes. Returns the key
    /// it was stored under (suffixed if the name was already taken).
    pub fn add_tool(&mut self, tool: AdditionalTool) -> Option<String> {
        add_tool(self.catalog, self.handlers, self.filters, tool)
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.retain(|r| r.uri != resource.uri);
        self.resources.push(resource);
    }

    pub fn add_prompt(&mut self, prompt: Prompt) {
        self.prompts.retain(|p| p.name != prompt.name);
        self.prompts.push(prompt);
    }
}

pub(crate) fn add_tool(
    catalog: &mut Catalog,
    handlers: &mut HandlerMap,
    filters: &ToolFilters,
    tool: AdditionalTool,
) -> Option<String> {
    if !tool.is_included(filters) {
        debug!(tool = %tool.tool.name, "Additional tool excluded by filters");
        return None;
    }
    let key = catalog.reserve_key(&tool.tool.name);
    let handler = tool.handler();
    let AdditionalTool {
        tool: mut definition,
        api,
        ..
    } = tool;
    definition.name.clone_from(&key);

    debug!(key = %key, "Registered additional tool");
    handlers.insert(key.clone(), handler);
    catalog.insert(key.clone(), definition, api);
    Some(key)
}
