//! Gateway configuration: downstream authorization and form-encoding quirks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hosts whose form bodies encode arrays as repeated keys (`k=a&k=b`) instead of a
/// JSON-stringified value.
pub const DEFAULT_ARRAY_REPEAT_HOSTS: &[&str] = &["serverless.twilio.com"];

/// Downstream API authorization.
///
/// Configuration files may carry types this gateway does not understand; those deserialize into
/// [`Authorization::Unsupported`] and are rejected when the gateway is constructed.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Authorization {
    #[serde(alias = "BasicAuth", alias = "basicAuth")]
    Basic { username: String, password: String },
    #[serde(alias = "BearerToken")]
    Bearer { token: String },
    #[serde(rename_all = "camelCase")]
    ApiKey { key: String, value: String },
    #[serde(other)]
    Unsupported,
}

impl Authorization {
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::ApiKey { .. } => "apiKey",
            Self::Unsupported => "unsupported",
        }
    }
}

// Secrets never reach logs through `{:?}`.
impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
            Self::ApiKey { key, .. } => f
                .debug_struct("ApiKey")
                .field("key", key)
                .field("value", &"<redacted>")
                .finish(),
            Self::Unsupported => f.write_str("Unsupported"),
        }
    }
}

/// Configuration for [`crate::HttpGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub authorization: Option<Authorization>,

    #[serde(default = "default_array_repeat_hosts")]
    pub array_repeat_hosts: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            authorization: None,
            array_repeat_hosts: default_array_repeat_hosts(),
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = Some(authorization);
        self
    }
}

fn default_array_repeat_hosts() -> Vec<String> {
    DEFAULT_ARRAY_REPEAT_HOSTS
        .iter()
        .map(|h| (*h).to_string())
        .collect()
}
