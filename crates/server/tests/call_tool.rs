use async_trait::async_trait;
use oapi_mcp_http_tools::{ApiDescriptor, HttpGateway, HttpMethod, HttpResult};
use oapi_mcp_openapi_tools::{InputSchema, ToolDefinition};
use oapi_mcp_server::account::{ACCOUNT_RESOURCE_URI, DESCRIBE_ACCOUNT_PROMPT};
use oapi_mcp_server::{
    AccountScopedHooks, AdditionalTool, AdditionalToolHandler, AdditionalTools, Capability,
    CapabilityRegistry, CapabilitySet, DefaultHooks, OpenApiMcpServer, ServerConfig, ServerError,
    ServerHooks,
};
use oapi_mcp_test_support::EchoServer;
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const SID: &str = "AC0123456789abcdef0123456789abcdef";

const CALLS_SPEC: &str = r#"
openapi: 3.0.3
info:
  title: Calls API
  description: Place and inspect calls.
  version: 1.0.0
servers:
  - url: BASE_URL
paths:
  /Accounts/{AccountSid}/Calls.json:
    parameters:
      - name: AccountSid
        in: path
        required: true
        schema:
          type: string
    get:
      operationId: ListCall
      tags: [calls]
      responses:
        '200':
          description: ok
    post:
      operationId: CreateCall
      tags: [calls]
      requestBody:
        content:
          application/x-www-form-urlencoded:
            schema:
              type: object
              required: [To]
              properties:
                To:
                  type: string
                From:
                  type: string
      responses:
        '201':
          description: created
  /status/{Code}:
    get:
      operationId: ForceStatus
      parameters:
        - name: Code
          in: path
          required: true
          schema:
            type: integer
      responses:
        '200':
          description: ok
"#;

const LIST_CALL: &str = "ApiCallsV1--ListCall";
const CREATE_CALL: &str = "ApiCallsV1--CreateCall";
const FORCE_STATUS: &str = "ApiCallsV1--ForceStatus";

fn write_specs(echo: &EchoServer) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let spec = CALLS_SPEC.replace("BASE_URL", echo.base_url());
    std::fs::write(dir.path().join("api_calls_v1.yaml"), spec).expect("write spec");
    dir
}

fn args(value: Value) -> Option<JsonObject> {
    value.as_object().cloned()
}

fn text_of(result: &CallToolResult) -> String {
    let value = serde_json::to_value(result).expect("serialize result");
    value["content"][0]["text"]
        .as_str()
        .expect("text content")
        .to_string()
}

fn echoed(result: &CallToolResult) -> Value {
    serde_json::from_str(&text_of(result)).expect("echo json")
}

async fn loaded(config: ServerConfig, hooks: impl ServerHooks + 'static) -> OpenApiMcpServer {
    let mut server = OpenApiMcpServer::new(config, hooks).expect("server");
    server.load().await.expect("load");
    server
}

#[tokio::test]
async fn get_tool_interpolates_path_and_returns_pretty_json() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);
    let server = loaded(ServerConfig::new(dir.path()), DefaultHooks).await;

    let keys: Vec<&str> = server.catalog().keys().collect();
    assert_eq!(keys, vec![CREATE_CALL, FORCE_STATUS, LIST_CALL]);

    let result = server
        .handle_call_tool(LIST_CALL, args(json!({"AccountSid": SID})))
        .await
        .expect("call");
    let text = text_of(&result);
    assert!(text.contains('\n'), "expected pretty-printed JSON: {text}");

    let echoed = echoed(&result);
    assert_eq!(echoed["method"], "GET");
    assert_eq!(echoed["path"], format!("/Accounts/{SID}/Calls.json"));
    assert_eq!(echoed["body"], "");
}

#[tokio::test]
async fn post_tool_sends_form_body() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);
    let server = loaded(ServerConfig::new(dir.path()), DefaultHooks).await;

    let result = server
        .handle_call_tool(
            &format!("  {CREATE_CALL}\n"),
            args(json!({"AccountSid": SID, "To": "+15550100"})),
        )
        .await
        .expect("call");

    let echoed = echoed(&result);
    assert_eq!(echoed["method"], "POST");
    assert_eq!(
        echoed["headers"]["content-type"],
        "application/x-www-form-urlencoded"
    );
    let body = echoed["body"].as_str().expect("body");
    assert!(body.contains("To=%2B15550100"), "body: {body}");
}

#[tokio::test]
async fn downstream_errors_carry_the_raw_body() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);
    let server = loaded(ServerConfig::new(dir.path()), DefaultHooks).await;

    let err = server
        .handle_call_tool(FORCE_STATUS, args(json!({"Code": 404})))
        .await
        .expect_err("404");
    match err {
        ServerError::DownstreamRequest(message) => {
            assert_eq!(message, EchoServer::status_body(404));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unknown_tools_are_rejected() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);
    let server = loaded(ServerConfig::new(dir.path()), DefaultHooks).await;

    let err = server
        .handle_call_tool("ApiCallsV1--DeleteCall", None)
        .await
        .expect_err("missing");
    assert!(matches!(
        err,
        ServerError::ToolNotFound { ref name, .. } if name == "ApiCallsV1--DeleteCall"
    ));
}

#[tokio::test]
async fn filters_apply_to_loaded_catalog() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);

    let mut config = ServerConfig::new(dir.path());
    config.filters = config.filters.with_tags(["calls"]);
    let tagged = loaded(config, DefaultHooks).await;
    assert_eq!(tagged.catalog().len(), 2);
    assert!(!tagged.catalog().contains_key(FORCE_STATUS));

    let mut config = ServerConfig::new(dir.path());
    config.filters = config.filters.with_services(["other_service_v1"]);
    let excluded = loaded(config, DefaultHooks).await;
    assert!(excluded.catalog().is_empty());
}

#[tokio::test]
async fn undeclared_capabilities_are_refused() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);
    let server = loaded(ServerConfig::new(dir.path()), DefaultHooks).await;

    assert!(matches!(
        server.resources(),
        Err(ServerError::CapabilityNotSupported(Capability::Resources))
    ));
    assert!(matches!(
        server.read_resource_by_uri(ACCOUNT_RESOURCE_URI).await,
        Err(ServerError::CapabilityNotSupported(Capability::Resources))
    ));
    assert!(matches!(
        server.get_prompt_by_name(DESCRIBE_ACCOUNT_PROMPT, None).await,
        Err(ServerError::CapabilityNotSupported(Capability::Prompts))
    ));
}

#[tokio::test]
async fn account_hooks_scope_tools_and_inject_the_account() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);
    let mut config = ServerConfig::new(dir.path());
    config.capabilities = CapabilitySet::all();
    let server = loaded(config, AccountScopedHooks::new(SID)).await;

    let list_call = server.catalog().tool(LIST_CALL).expect("tool");
    assert!(list_call.description.ends_with(&format!("{SID} is used.")));
    assert!(!list_call.input_schema.is_required("AccountSid"));
    let force_status = server.catalog().tool(FORCE_STATUS).expect("tool");
    assert!(force_status.input_schema.is_required("Code"));

    let result = server
        .handle_call_tool(LIST_CALL, args(json!({"AccountSid": "bogus"})))
        .await
        .expect("call");
    assert_eq!(echoed(&result)["path"], format!("/Accounts/{SID}/Calls.json"));

    let resources = server.resources().expect("resources");
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].uri, ACCOUNT_RESOURCE_URI);
    assert_eq!(server.prompts().expect("prompts").len(), 1);

    let resource = server
        .read_resource_by_uri(ACCOUNT_RESOURCE_URI)
        .await
        .expect("read");
    let resource = serde_json::to_value(&resource).expect("json");
    assert_eq!(resource["contents"][0]["text"], format!("The accountSid is {SID}"));

    assert!(matches!(
        server.get_prompt_by_name("unknown", None).await,
        Err(ServerError::PromptNotFound(_))
    ));
}

struct FixedHandler;

#[async_trait]
impl AdditionalToolHandler for FixedHandler {
    async fn call(
        &self,
        _gateway: &HttpGateway,
        api: &ApiDescriptor,
        body: JsonObject,
    ) -> HttpResult {
        HttpResult::Success {
            status: 201,
            body: json!({"handled": api.path, "received": body}),
        }
    }
}

fn upload_tool(name: &str) -> AdditionalTool {
    AdditionalTool::new(
        ToolDefinition::new(name, "Upload an asset", InputSchema::new()),
        ApiDescriptor::new(HttpMethod::Post, "https://uploads.example.com/v1/Assets"),
        FixedHandler,
    )
}

#[tokio::test]
async fn additional_tools_dispatch_to_their_handler() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);

    let mut tools = AdditionalTools::new();
    tools.register(upload_tool("Uploads--CreateAsset"));
    tools.register(upload_tool(LIST_CALL));
    tools.register(upload_tool("Uploads--Hidden").for_service("uploads_v1"));

    let mut config = ServerConfig::new(dir.path());
    config.filters = config.filters.with_services(["api_calls_v1"]);
    let mut server = OpenApiMcpServer::new(config, DefaultHooks)
        .expect("server")
        .with_additional_tools(tools);
    server.load().await.expect("load");

    assert!(server.catalog().contains_key("Uploads--CreateAsset"));
    assert!(server.catalog().contains_key(&format!("{LIST_CALL}_1")));
    assert!(!server.catalog().contains_key("Uploads--Hidden"));

    let result = server
        .handle_call_tool("Uploads--CreateAsset", args(json!({"FileName": "a.txt"})))
        .await
        .expect("call");
    let body = echoed(&result);
    assert_eq!(body["handled"], "https://uploads.example.com/v1/Assets");
    assert_eq!(body["received"]["FileName"], "a.txt");

    server.load().await.expect("reload");
    assert_eq!(server.catalog().len(), 5);
}

struct SummaryHooks;

impl ServerHooks for SummaryHooks {
    fn prepare_body(
        &self,
        _tool: &ToolDefinition,
        _api: &ApiDescriptor,
        mut body: JsonObject,
    ) -> JsonObject {
        body.insert("AccountSid".to_string(), json!(SID));
        body
    }

    fn prepare_response(
        &self,
        tool: &ToolDefinition,
        _api: &ApiDescriptor,
        data: &Value,
        _response: CallToolResult,
    ) -> CallToolResult {
        let method = data["method"].as_str().unwrap_or_default();
        CallToolResult::success(vec![Content::text(format!("{} {method}", tool.name))])
    }
}

#[tokio::test]
async fn hooks_rewrite_body_and_response() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);
    let server = loaded(ServerConfig::new(dir.path()), SummaryHooks).await;

    let result = server.handle_call_tool(LIST_CALL, None).await.expect("call");
    assert_eq!(text_of(&result), format!("{LIST_CALL} GET"));
}

#[derive(Default)]
struct RegisteringHooks {
    keys: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl ServerHooks for RegisteringHooks {
    async fn extend_capabilities(
        &self,
        registry: &mut CapabilityRegistry<'_>,
    ) -> oapi_mcp_server::Result<()> {
        let added = vec![
            registry.add_tool(upload_tool("Uploads--CreateAsset")),
            registry.add_tool(upload_tool(CREATE_CALL)),
            registry.add_tool(upload_tool("Uploads--Hidden").for_service("uploads_v1")),
        ];
        self.keys.lock().expect("keys").extend(added);
        Ok(())
    }
}

#[tokio::test]
async fn hooks_register_tools_through_the_capability_registry() {
    let echo = EchoServer::start().await.expect("echo");
    let dir = write_specs(&echo);
    let mut config = ServerConfig::new(dir.path());
    config.filters = config.filters.with_services(["api_calls_v1"]);

    let hooks = Arc::new(RegisteringHooks::default());
    let server = loaded(config, SharedHooks(hooks.clone())).await;

    let keys = hooks.keys.lock().expect("keys").clone();
    assert_eq!(
        keys,
        vec![
            Some("Uploads--CreateAsset".to_string()),
            Some(format!("{CREATE_CALL}_1")),
            None,
        ]
    );
    assert_eq!(server.catalog().len(), 5);
    assert!(!server.catalog().contains_key("Uploads--Hidden"));
    assert_eq!(
        server.catalog().tool(&format!("{CREATE_CALL}_1")).expect("tool").name,
        format!("{CREATE_CALL}_1")
    );

    let result = server
        .handle_call_tool("Uploads--CreateAsset", args(json!({"FileName": "b.txt"})))
        .await
        .expect("call");
    let body = echoed(&result);
    assert_eq!(body["handled"], "https://uploads.example.com/v1/Assets");
    assert_eq!(body["received"]["FileName"], "b.txt");

    let original = server
        .handle_call_tool(CREATE_CALL, args(json!({"AccountSid": SID, "To": "+1"})))
        .await
        .expect("call");
    assert_eq!(echoed(&original)["method"], "POST");
}

struct SharedHooks(Arc<RegisteringHooks>);

#[async_trait]
impl ServerHooks for SharedHooks {
    async fn extend_capabilities(
        &self,
        registry: &mut CapabilityRegistry<'_>,
    ) -> oapi_mcp_server::Result<()> {
        self.0.extend_capabilities(registry).await
    }
}
