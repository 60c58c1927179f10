//! Hand-authored tools merged into the compiled catalog.
//!
//! An additional tool is stored in the catalog like any compiled tool, but its calls are routed
//! to its own [`AdditionalToolHandler`] instead of straight through the gateway.

use async_trait::async_trait;
use oapi_mcp_http_tools::{ApiDescriptor, HttpGateway, HttpResult};
use oapi_mcp_openapi_tools::{ToolDefinition, ToolFilters};
use rmcp::model::JsonObject;
use std::fmt;
use std::sync::Arc;

/// Executes an additional tool. Receives the body after `prepare_body`.
#[async_trait]
pub trait AdditionalToolHandler: Send + Sync {
    async fn call(
        &self,
        gateway: &HttpGateway,
        api: &ApiDescriptor,
        body: JsonObject,
    ) -> HttpResult;
}

/// Decides from the active filters whether an additional tool is exposed.
pub type IncludeWhen = dyn Fn(&ToolFilters) -> bool + Send + Sync;

#[derive(Clone)]
pub struct AdditionalTool {
    pub tool: ToolDefinition,
    pub api: ApiDescriptor,
    include_when: Arc<IncludeWhen>,
    handler: Arc<dyn AdditionalToolHandler>,
}

impl fmt::Debug for AdditionalTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdditionalTool")
            .field("tool", &self.tool.name)
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl AdditionalTool {
    /// Always included. The tool's name is used as its catalog key.
    pub fn new(
        tool: ToolDefinition,
        api: ApiDescriptor,
        handler: impl AdditionalToolHandler + 'static,
    ) -> Self {
        Self {
            tool,
            api,
            include_when: Arc::new(|_| true),
            handler: Arc::new(handler),
        }
    }

    #[must_use]
    pub fn include_when(
        mut self,
        predicate: impl Fn(&ToolFilters) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.include_when = Arc::new(predicate);
        self
    }

    /// Included only when `service` passes the service allow-list.
    #[must_use]
    pub fn for_service(self, service: impl Into<String>) -> Self {
        let service = service.into();
        self.include_when(move |filters| {
            filters.services.is_empty() || filters.services.contains(&service)
        })
    }

    #[must_use]
    pub fn is_included(&self, filters: &ToolFilters) -> bool {
        (self.include_when)(filters)
    }

    pub(crate) fn handler(&self) -> Arc<dyn AdditionalToolHandler> {
        Arc::clone(&self.handler)
    }
}

/// Additional tools registered before the server loads.
#[derive(Debug, Clone, Default)]
pub struct AdditionalTools {
    entries: Vec<AdditionalTool>,
}

impl AdditionalTools {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: AdditionalTool) {
        self.entries.push(tool);
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdditionalTool> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Forwards the call to the gateway using the tool's own API descriptor.
///
/// Useful for tools whose schema is hand-written but whose request is a plain HTTP call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughHandler;

#[async_trait]
impl AdditionalToolHandler for PassthroughHandler {
    async fn call(
        &self,
        gateway: &HttpGateway,
        api: &ApiDescriptor,
        body: JsonObject,
    ) -> HttpResult {
        gateway.execute(api, Some(body)).await
    }
}
