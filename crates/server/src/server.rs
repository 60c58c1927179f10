//! MCP server exposing compiled OpenAPI operations as tools.
//!
//! Lifecycle: [`OpenApiMcpServer::new`] builds the gateway, [`OpenApiMcpServer::load`] scans the
//! spec directory and compiles the catalog, and [`OpenApiMcpServer::start`] binds the transport
//! and serves until the peer disconnects.

use crate::additional::{AdditionalTool, AdditionalTools};
use crate::capability::{Capability, CapabilitySet};
use crate::error::{Result, ServerError};
use crate::hooks::{self, CapabilityRegistry, HandlerMap, ServerHooks};
use oapi_mcp_http_tools::{GatewayConfig, HttpGateway, HttpResult};
use oapi_mcp_openapi_tools::{Catalog, SpecRepository, ToolCompiler, ToolFilters};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, GetPromptRequestParams, GetPromptResult,
    Implementation, JsonObject, ListPromptsResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParams, Prompt, ReadResourceRequestParams, ReadResourceResult, Resource,
    ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::transport::IntoTransport;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Static server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
    pub capabilities: CapabilitySet,
    pub api_dir: PathBuf,
    pub filters: ToolFilters,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    /// Tools only, no filters, no authorization.
    #[must_use]
    pub fn new(api_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            capabilities: CapabilitySet::default(),
            api_dir: api_dir.into(),
            filters: ToolFilters::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

pub struct OpenApiMcpServer {
    config: ServerConfig,
    gateway: HttpGateway,
    hooks: Arc<dyn ServerHooks>,
    additional: AdditionalTools,
    catalog: Catalog,
    handlers: HandlerMap,
    resources: Vec<Resource>,
    prompts: Vec<Prompt>,
    loaded: bool,
}

impl OpenApiMcpServer {
    /// Fails if the gateway configuration carries an unsupported authorization.
    pub fn new(config: ServerConfig, hooks: impl ServerHooks + 'static) -> Result<Self> {
        let gateway = HttpGateway::new(&config.gateway)?;
        Ok(Self {
            config,
            gateway,
            hooks: Arc::new(hooks),
            additional: AdditionalTools::new(),
            catalog: Catalog::new(),
            handlers: HandlerMap::new(),
            resources: Vec::new(),
            prompts: Vec::new(),
            loaded: false,
        })
    }

    /// Tools merged into the catalog on every [`load`](Self::load).
    #[must_use]
    pub fn with_additional_tools(mut self, tools: AdditionalTools) -> Self {
        self.additional = tools;
        self
    }

    pub fn register_additional_tool(&mut self, tool: AdditionalTool) {
        self.additional.register(tool);
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Scan the spec directory and rebuild the catalog from scratch.
    #[instrument(skip(self), fields(api_dir = %self.config.api_dir.display()))]
    pub async fn load(&mut self) -> Result<()> {
        let specs = SpecRepository::new(&self.config.api_dir).load().await?;
        let compiler = ToolCompiler::new(self.config.filters.clone());

        self.catalog = compiler.compile(&specs);
        self.handlers.clear();
        self.resources.clear();
        self.prompts.clear();

        for tool in self.additional.iter() {
            hooks::add_tool(
                &mut self.catalog,
                &mut self.handlers,
                &self.config.filters,
                tool.clone(),
            );
        }

        let hooks = Arc::clone(&self.hooks);
        let mut registry = CapabilityRegistry {
            catalog: &mut self.catalog,
            handlers: &mut self.handlers,
            resources: &mut self.resources,
            prompts: &mut self.prompts,
            filters: &self.config.filters,
            capabilities: &self.config.capabilities,
        };
        hooks.extend_capabilities(&mut registry).await?;

        self.loaded = true;
        info!(
            specs = specs.len(),
            tools = self.catalog.len(),
            resources = self.resources.len(),
            prompts = self.prompts.len(),
            "Loaded tool catalog"
        );
        Ok(())
    }

    /// Load if needed, bind `transport`, and serve until the peer closes.
    #[instrument(skip_all, fields(server = %self.config.name))]
    pub async fn start<T, E, A>(mut self, transport: T) -> Result<()>
    where
        T: IntoTransport<RoleServer, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.loaded {
            self.load().await?;
        }

        info!("Starting MCP server");
        let service = self
            .serve(transport)
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;
        service
            .waiting()
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;
        info!("MCP server stopped");
        Ok(())
    }

    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.config.capabilities.contains(capability)
    }

    /// Fails with [`ServerError::CapabilityNotSupported`] if `capability` was not declared.
    pub fn ensure_capability(&self, capability: Capability) -> Result<()> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(ServerError::CapabilityNotSupported(capability))
        }
    }

    #[must_use]
    pub fn tools(&self) -> Vec<rmcp::model::Tool> {
        self.catalog.iter().map(|(_, tool, _)| tool.to_mcp_tool()).collect()
    }

    pub fn resources(&self) -> Result<&[Resource]> {
        self.ensure_capability(Capability::Resources)?;
        Ok(&self.resources)
    }

    pub fn prompts(&self) -> Result<&[Prompt]> {
        self.ensure_capability(Capability::Prompts)?;
        Ok(&self.prompts)
    }

    pub async fn read_resource_by_uri(&self, uri: &str) -> Result<ReadResourceResult> {
        self.ensure_capability(Capability::Resources)?;
        self.hooks.read_resource(uri).await
    }

    pub async fn get_prompt_by_name(
        &self,
        name: &str,
        arguments: Option<&JsonObject>,
    ) -> Result<GetPromptResult> {
        self.ensure_capability(Capability::Prompts)?;
        self.hooks.get_prompt(name, arguments).await
    }

    /// Resolve `name` to a catalog entry, run the request, and wrap the parsed body as text.
    pub async fn handle_call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult> {
        let key = name.trim();
        let (tool, api) = self
            .catalog
            .get(key)
            .ok_or_else(|| ServerError::ToolNotFound {
                key: key.to_string(),
                name: name.to_string(),
            })?;

        let body = self.hooks.prepare_body(tool, api, arguments.unwrap_or_default());
        let result = match self.handlers.get(key) {
            Some(handler) => handler.call(&self.gateway, api, body).await,
            None => self.gateway.execute(api, Some(body)).await,
        };

        match result {
            HttpResult::Failure { status, message } => {
                error!(
                    api = %api.path,
                    method = %api.method,
                    tool = %key,
                    status,
                    error = %message,
                    "Downstream request failed"
                );
                Err(ServerError::DownstreamRequest(message))
            }
            HttpResult::Success { status, body: data } => {
                debug!(tool = %key, status, "Downstream request succeeded");
                let text = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
                let response = CallToolResult::success(vec![Content::text(text)]);
                Ok(self.hooks.prepare_response(tool, api, &data, response))
            }
        }
    }
}

impl ServerHandler for OpenApiMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: self.config.instructions.clone(),
            capabilities: self.config.capabilities.to_server_capabilities(),
            server_info: Implementation {
                name: self.config.name.clone(),
                version: self.config.version.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[instrument(skip(self, _context))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tools(),
            ..Default::default()
        })
    }

    #[instrument(skip(self, request, _context), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        info!("Calling tool");
        self.handle_call_tool(&request.name, request.arguments)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self, _context))]
    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: self.resources()?.to_vec(),
            ..Default::default()
        })
    }

    #[instrument(skip(self, _context))]
    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ReadResourceResult, McpError> {
        info!("Reading resource: {}", request.uri);
        Ok(self.read_resource_by_uri(&request.uri).await?)
    }

    #[instrument(skip(self, _context))]
    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult {
            prompts: self.prompts()?.to_vec(),
            ..Default::default()
        })
    }

    #[instrument(skip(self, _context))]
    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<GetPromptResult, McpError> {
        info!("Getting prompt: {}", request.name);
        Ok(self
            .get_prompt_by_name(&request.name, request.arguments.as_ref())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::DefaultHooks;
    use oapi_mcp_http_tools::Authorization;

    #[test]
    fn unsupported_authorization_fails_at_construction() {
        let mut config = ServerConfig::new("/nonexistent");
        config.gateway = GatewayConfig::default().with_authorization(Authorization::Unsupported);
        let err = OpenApiMcpServer::new(config, DefaultHooks).err();
        assert!(matches!(err, Some(ServerError::Gateway(_))));
    }

    #[test]
    fn ensure_capability_checks_the_declared_set() {
        let server = OpenApiMcpServer::new(ServerConfig::new("/nonexistent"), DefaultHooks)
            .expect("server");
        assert!(server.ensure_capability(Capability::Tools).is_ok());
        assert!(matches!(
            server.ensure_capability(Capability::Resources),
            Err(ServerError::CapabilityNotSupported(Capability::Resources))
        ));
        assert!(matches!(
            server.ensure_capability(Capability::Prompts),
            Err(ServerError::CapabilityNotSupported(Capability::Prompts))
        ));
    }

    #[tokio::test]
    async fn unknown_tool_names_the_request() {
        let server = OpenApiMcpServer::new(ServerConfig::new("/nonexistent"), DefaultHooks)
            .expect("server");
        let err = server
            .handle_call_tool(" Missing--tool ", None)
            .await
            .expect_err("missing tool");
        assert_eq!(err.to_string(), "Tool (Missing--tool) not found:  Missing--tool ");
    }

    #[tokio::test]
    async fn loading_a_missing_directory_fails() {
        let config = ServerConfig::new("/nonexistent/oapi-mcp");
        let mut server = OpenApiMcpServer::new(config, DefaultHooks).expect("server");
        assert!(matches!(server.load().await, Err(ServerError::Load(_))));
        assert!(!server.is_loaded());
    }
}
