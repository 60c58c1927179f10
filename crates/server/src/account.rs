//! Account-scoped specialization.
//!
//! Many APIs take the owning account identifier as a path parameter on every operation. These
//! hooks fill it in from the configured account whenever the caller omits it or sends something
//! that is not a valid account id, and advertise the account through a resource and a prompt.

use crate::capability::Capability;
use crate::error::{Result, ServerError};
use crate::hooks::{CapabilityRegistry, ServerHooks};
use async_trait::async_trait;
use oapi_mcp_http_tools::ApiDescriptor;
use oapi_mcp_openapi_tools::ToolDefinition;
use regex::Regex;
use rmcp::model::{
    Annotated, GetPromptResult, JsonObject, Prompt, PromptMessage, PromptMessageRole, RawResource,
    ReadResourceResult, ResourceContents,
};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

pub const ACCOUNT_RESOURCE_URI: &str = "text://accountSid";
pub const DESCRIBE_ACCOUNT_PROMPT: &str = "describe_account";

/// Body keys checked for the account id, in order.
const ACCOUNT_FIELDS: [&str; 2] = ["AccountSid", "accountSid"];

static HEX_32: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{32}$").expect("valid hex regex"));

/// `true` if `sid` is `prefix` followed by 32 hex digits, e.g. `AC` for accounts, `SK` for keys.
#[must_use]
pub fn is_valid_sid(sid: &str, prefix: &str) -> bool {
    sid.strip_prefix(prefix).is_some_and(|rest| HEX_32.is_match(rest))
}

/// Server instructions telling the agent which account to default to.
#[must_use]
pub fn instructions(account_sid: &str) -> String {
    format!(
        "You are an agent to call the APIs. \
         If no accountSid is provided, you MUST use {account_sid}"
    )
}

#[derive(Debug, Clone)]
pub struct AccountScopedHooks {
    account_sid: String,
}

impl AccountScopedHooks {
    #[must_use]
    pub fn new(account_sid: impl Into<String>) -> Self {
        Self {
            account_sid: account_sid.into(),
        }
    }

    #[must_use]
    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    fn account_field(tool: &ToolDefinition) -> Option<&'static str> {
        ACCOUNT_FIELDS
            .into_iter()
            .find(|field| tool.input_schema.property(field).is_some())
    }

    fn description(&self) -> String {
        format!("The accountSid is {}", self.account_sid)
    }
}

#[async_trait]
impl ServerHooks for AccountScopedHooks {
    async fn extend_capabilities(&self, registry: &mut CapabilityRegistry<'_>) -> Result<()> {
        let note = format!(
            " If no account id is provided, {} is used.",
            self.account_sid
        );
        let mut scoped = 0usize;
        for (_, tool) in registry.catalog_mut().tools_mut() {
            let Some(field) = Self::account_field(tool) else {
                continue;
            };
            tool.input_schema.make_optional(field);
            tool.description.push_str(&note);
            scoped += 1;
        }
        debug!(tools = scoped, "Scoped tools to the configured account");

        if registry.has_capability(Capability::Resources) {
            let mut resource = RawResource::new(ACCOUNT_RESOURCE_URI, "accountSid");
            resource.description = Some("The account used when a tool call omits one".to_string());
            resource.mime_type = Some("text/plain".to_string());
            registry.add_resource(Annotated::new(resource, None));
        }
        if registry.has_capability(Capability::Prompts) {
            registry.add_prompt(Prompt::new(
                DESCRIBE_ACCOUNT_PROMPT,
                Some("Describe the configured account"),
                None,
            ));
        }
        Ok(())
    }

    fn prepare_body(
        &self,
        tool: &ToolDefinition,
        _api: &ApiDescriptor,
        mut body: JsonObject,
    ) -> JsonObject {
        let Some(field) = Self::account_field(tool) else {
            return body;
        };
        let provided = body.get(field).and_then(Value::as_str);
        if provided.is_none_or(|sid| !is_valid_sid(sid, "AC")) {
            debug!(tool = %tool.name, field, "Injecting default account");
            body.insert(field.to_string(), Value::String(self.account_sid.clone()));
        }
        body
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        if uri != ACCOUNT_RESOURCE_URI {
            return Err(ServerError::ResourceNotFound(uri.to_string()));
        }
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(self.description(), uri)],
        })
    }

    async fn get_prompt(
        &self,
        name: &str,
        _arguments: Option<&JsonObject>,
    ) -> Result<GetPromptResult> {
        if name != DESCRIBE_ACCOUNT_PROMPT {
            return Err(ServerError::PromptNotFound(name.to_string()));
        }
        Ok(GetPromptResult {
            description: Some("Describe the configured account".to_string()),
            messages: vec![PromptMessage::new_text(
                PromptMessageRole::User,
                self.description(),
            )],
        })
    }
}
