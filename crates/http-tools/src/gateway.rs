//! The HTTP gateway: authorized downstream requests with normalized results.

use crate::api::{ApiDescriptor, ContentType, HttpMethod};
use crate::config::{Authorization, GatewayConfig};
use crate::error::{HttpToolsError, Result};
use crate::form::{encode_form, stringify};
use base64::Engine as _;
use regex::{Captures, Regex};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::{debug, error};
use url::Url;

/// Message returned when the request never produced an HTTP response.
pub const REQUEST_FAILED_MESSAGE: &str = "An error occurred while making the request";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(.*?)\}").expect("placeholder pattern is valid"));

/// Outcome of a downstream call.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpResult {
    /// 2xx response. Empty bodies are `null`; non-JSON bodies are a JSON string.
    Success { status: u16, body: Value },
    /// Non-2xx response (raw body text) or a transport failure (status 500).
    Failure { status: u16, message: String },
}

impl HttpResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Success { status, .. } | Self::Failure { status, .. } => *status,
        }
    }

    fn request_failed() -> Self {
        Self::Failure {
            status: 500,
            message: REQUEST_FAILED_MESSAGE.to_string(),
        }
    }
}

/// Request payload: plain fields (encoded per content type) or a prebuilt multipart form.
#[derive(Debug)]
pub enum RequestPayload {
    Fields(Map<String, Value>),
    Multipart(Form),
}

/// Performs authorized HTTP requests against downstream APIs.
///
/// Authorization headers are computed once at construction; the gateway is cheap to clone and
/// safe to share between concurrent tool calls.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    auth_headers: HeaderMap,
    array_repeat_hosts: Arc<[String]>,
}

impl HttpGateway {
    /// Build a gateway from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::UnsupportedAuthorization`] if the authorization type is unknown
    /// or its values cannot be sent as headers.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let auth_headers = authorization_headers(config.authorization.as_ref())?;
        let client = Client::builder()
            .build()
            .map_err(|e| HttpToolsError::Client(sanitize_reqwest_error(&e)))?;

        Ok(Self {
            client,
            auth_headers,
            array_repeat_hosts: config.array_repeat_hosts.clone().into(),
        })
    }

    /// Execute the HTTP call described by `api`, interpolating `{param}` placeholders in its
    /// path from `body` and sending the body itself as the request payload.
    pub async fn execute(
        &self,
        api: &ApiDescriptor,
        body: Option<Map<String, Value>>,
    ) -> HttpResult {
        let url = match &body {
            Some(fields) => interpolate_fields(&api.path, fields),
            None => api.path.clone(),
        };
        self.request(api.method, &url, body.map(RequestPayload::Fields), api.content_type)
            .await
    }

    /// POST a multipart form (file uploads).
    pub async fn upload(&self, url: &str, form: Form) -> HttpResult {
        self.request(
            HttpMethod::Post,
            url,
            Some(RequestPayload::Multipart(form)),
            ContentType::Multipart,
        )
        .await
    }

    /// Perform one request and normalize the outcome. Never fails: transport errors are logged
    /// and reported as a 500 [`HttpResult::Failure`].
    pub async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        payload: Option<RequestPayload>,
        content_type: ContentType,
    ) -> HttpResult {
        debug!(%method, url = %redact_url_str(url), %content_type, "Downstream request");

        let payload = if method.has_body() { payload } else { None };
        let request = self
            .client
            .request(method.to_reqwest(), url)
            .headers(self.auth_headers.clone());
        let request = self.attach_payload(request, url, payload, content_type);

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %sanitize_reqwest_error(&e), "Downstream request failed");
                return HttpResult::request_failed();
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %sanitize_reqwest_error(&e), "Failed to read downstream response");
                return HttpResult::request_failed();
            }
        };

        if !status.is_success() {
            debug!(status = status.as_u16(), "Downstream returned an error status");
            return HttpResult::Failure {
                status: status.as_u16(),
                message: text,
            };
        }

        HttpResult::Success {
            status: status.as_u16(),
            body: parse_body(&text),
        }
    }

    fn attach_payload(
        &self,
        request: RequestBuilder,
        url: &str,
        payload: Option<RequestPayload>,
        content_type: ContentType,
    ) -> RequestBuilder {
        // reqwest sets the multipart boundary itself; an explicit Content-Type would drop it.
        match (payload, content_type) {
            (Some(RequestPayload::Multipart(form)), _) => request.multipart(form),
            (Some(RequestPayload::Fields(fields)), ContentType::Multipart) => {
                request.multipart(fields_to_form(fields))
            }
            (Some(RequestPayload::Fields(fields)), ContentType::FormUrlEncoded) => request
                .header(CONTENT_TYPE, content_type.as_mime())
                .body(encode_form(&fields, self.repeats_arrays(url))),
            (Some(RequestPayload::Fields(fields)), ContentType::Json) => request
                .header(CONTENT_TYPE, content_type.as_mime())
                .body(Value::Object(fields).to_string()),
            (None, ContentType::Multipart) => request,
            (None, ct) => request.header(CONTENT_TYPE, ct.as_mime()),
        }
    }

    fn repeats_arrays(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };
        self.array_repeat_hosts.iter().any(|h| {
            let h = h.to_ascii_lowercase();
            host == h || host.ends_with(&format!(".{h}"))
        })
    }
}

/// Replace `{key}` placeholders in `url` with values from `params`.
///
/// Only string, number and boolean values are substituted; other values and missing keys leave
/// the placeholder in place. Non-object params (including arrays) return `url` unchanged.
#[must_use]
pub fn interpolate_url(url: &str, params: Option<&Value>) -> String {
    match params {
        Some(Value::Object(fields)) => interpolate_fields(url, fields),
        _ => url.to_string(),
    }
}

fn interpolate_fields(url: &str, fields: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(url, |caps: &Captures<'_>| match fields.get(&caps[1]) {
            Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => stringify(v),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn authorization_headers(auth: Option<&Authorization>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let Some(auth) = auth else {
        return Ok(headers);
    };

    match auth {
        Authorization::Basic { username, password } => {
            let encoded =
                base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
            headers.insert(AUTHORIZATION, sensitive_value(&format!("Basic {encoded}"), auth)?);
        }
        Authorization::Bearer { token } => {
            headers.insert(AUTHORIZATION, sensitive_value(&format!("Bearer {token}"), auth)?);
        }
        Authorization::ApiKey { key, value } => {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                HttpToolsError::UnsupportedAuthorization(format!("invalid header name '{key}'"))
            })?;
            headers.insert(name, sensitive_value(value, auth)?);
        }
        Authorization::Unsupported => {
            return Err(HttpToolsError::UnsupportedAuthorization(
                auth.kind().to_string(),
            ));
        }
    }

    Ok(headers)
}

fn sensitive_value(raw: &str, auth: &Authorization) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(raw).map_err(|_| {
        HttpToolsError::UnsupportedAuthorization(format!(
            "{} credentials are not valid header text",
            auth.kind()
        ))
    })?;
    value.set_sensitive(true);
    Ok(value)
}

fn fields_to_form(fields: Map<String, Value>) -> Form {
    fields
        .into_iter()
        .fold(Form::new(), |form, (k, v)| form.text(k, stringify(&v)))
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

fn redact_url_str(url: &str) -> String {
    Url::parse(url).map_or_else(|_| url.to_string(), |u| redact_url(&u))
}

fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use oapi_mcp_test_support::EchoServer;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn gateway(auth: Option<Authorization>) -> HttpGateway {
        let config = GatewayConfig {
            authorization: auth,
            ..GatewayConfig::default()
        };
        HttpGateway::new(&config).unwrap()
    }

    fn success_body(result: HttpResult) -> Value {
        match result {
            HttpResult::Success { body, .. } => body,
            HttpResult::Failure { status, message } => {
                panic!("unexpected failure {status}: {message}")
            }
        }
    }

    #[test]
    fn interpolate_replaces_scalar_placeholders() {
        let url = interpolate_url(
            "https://api.example.com/v1/Accounts/{AccountSid}/Calls/{Sid}.json",
            Some(&json!({"AccountSid": "AC123", "Sid": 42, "Other": "x"})),
        );
        assert_eq!(url, "https://api.example.com/v1/Accounts/AC123/Calls/42.json");
    }

    #[test]
    fn interpolate_leaves_missing_and_complex_values() {
        let url = interpolate_url(
            "/a/{missing}/{obj}/{flag}",
            Some(&json!({"obj": {"k": 1}, "flag": true})),
        );
        assert_eq!(url, "/a/{missing}/{obj}/true");
    }

    #[test]
    fn interpolate_keeps_null_and_array_values_literal() {
        let url = interpolate_url(
            "/Services/{ServiceSid}/Items/{Sids}/{Id}",
            Some(&json!({"ServiceSid": null, "Sids": ["IT1", "IT2"], "Id": 7})),
        );
        assert_eq!(url, "/Services/{ServiceSid}/Items/{Sids}/7");
    }

    #[test]
    fn interpolate_ignores_array_params() {
        let url = interpolate_url("/a/{x}", Some(&json!(["x"])));
        assert_eq!(url, "/a/{x}");
        assert_eq!(interpolate_url("/a/{x}", None), "/a/{x}");
    }

    #[test]
    fn unsupported_authorization_is_rejected() {
        let config = GatewayConfig::default().with_authorization(Authorization::Unsupported);
        let err = HttpGateway::new(&config).unwrap_err();
        assert!(matches!(err, HttpToolsError::UnsupportedAuthorization(_)));
    }

    #[test]
    fn api_key_with_invalid_header_name_is_rejected() {
        let config = GatewayConfig::default().with_authorization(Authorization::ApiKey {
            key: "bad header".to_string(),
            value: "v".to_string(),
        });
        assert!(HttpGateway::new(&config).is_err());
    }

    #[tokio::test]
    async fn get_sends_basic_auth_and_no_body() {
        let echo = EchoServer::start().await.unwrap();
        let gw = gateway(Some(Authorization::basic("user", "pass")));

        let result = gw
            .request(
                HttpMethod::Get,
                &echo.url("/v1/Things?Page=2"),
                Some(RequestPayload::Fields(fields(json!({"ignored": true})))),
                ContentType::Json,
            )
            .await;

        assert_eq!(result.status(), 200);
        let body = success_body(result);
        assert_eq!(body["method"], "GET");
        assert_eq!(body["path"], "/v1/Things");
        assert_eq!(body["query"], "Page=2");
        assert_eq!(body["headers"]["authorization"], "Basic dXNlcjpwYXNz");
        assert_eq!(body["body"], "");
    }

    #[tokio::test]
    async fn bearer_and_api_key_headers_are_attached() {
        let echo = EchoServer::start().await.unwrap();

        let bearer = gateway(Some(Authorization::Bearer { token: "tok".to_string() }));
        let url = echo.url("/x");
        let result = bearer.request(HttpMethod::Delete, &url, None, ContentType::Json);
        let body = success_body(result.await);
        assert_eq!(body["headers"]["authorization"], "Bearer tok");

        let api_key = gateway(Some(Authorization::ApiKey {
            key: "x-api-key".to_string(),
            value: "secret".to_string(),
        }));
        let url = echo.url("/x");
        let result = api_key.request(HttpMethod::Get, &url, None, ContentType::Json);
        let body = success_body(result.await);
        assert_eq!(body["headers"]["x-api-key"], "secret");
        assert!(body["headers"].get("authorization").is_none());
    }

    #[tokio::test]
    async fn post_json_body() {
        let echo = EchoServer::start().await.unwrap();
        let gw = gateway(None);

        let api = ApiDescriptor::new(HttpMethod::Post, echo.url("/v1/Items/{Sid}"));
        let item = fields(json!({"Sid": "IT1", "Name": "n"}));
        let body = success_body(gw.execute(&api, Some(item)).await);

        assert_eq!(body["path"], "/v1/Items/IT1");
        assert_eq!(body["headers"]["content-type"], "application/json");
        let sent: Value = serde_json::from_str(body["body"].as_str().unwrap()).unwrap();
        assert_eq!(sent, json!({"Sid": "IT1", "Name": "n"}));
    }

    #[tokio::test]
    async fn post_form_body_stringifies_arrays() {
        let echo = EchoServer::start().await.unwrap();
        let gw = gateway(None);

        let api = ApiDescriptor::new(HttpMethod::Post, echo.url("/form"))
            .with_content_type(ContentType::FormUrlEncoded);
        let body = success_body(gw.execute(&api, Some(fields(json!({"Tags": ["a", "b"]})))).await);

        assert_eq!(body["headers"]["content-type"], "application/x-www-form-urlencoded");
        assert_eq!(body["body"], "Tags=%5B%22a%22%2C%22b%22%5D");
    }

    #[tokio::test]
    async fn array_repeat_hosts_repeat_keys() {
        let echo = EchoServer::start().await.unwrap();
        let config = GatewayConfig {
            authorization: None,
            array_repeat_hosts: vec!["127.0.0.1".to_string()],
        };
        let gw = HttpGateway::new(&config).unwrap();

        let api = ApiDescriptor::new(HttpMethod::Put, echo.url("/form"))
            .with_content_type(ContentType::FormUrlEncoded);
        let body = success_body(gw.execute(&api, Some(fields(json!({"Tags": ["a", "b"]})))).await);

        assert_eq!(body["body"], "Tags=a&Tags=b");
    }

    #[tokio::test]
    async fn multipart_upload_lets_client_set_boundary() {
        let echo = EchoServer::start().await.unwrap();
        let gw = gateway(None);

        let form = Form::new().text("Path", "/hello.js").part(
            "Content",
            reqwest::multipart::Part::bytes(b"exports.handler = () => {};".to_vec())
                .file_name("hello.js"),
        );
        let body = success_body(gw.upload(&echo.url("/upload"), form).await);

        let ct = body["headers"]["content-type"].as_str().unwrap();
        assert!(ct.starts_with("multipart/form-data; boundary="), "{ct}");
        assert!(body["body"].as_str().unwrap().contains("exports.handler"));
    }

    #[tokio::test]
    async fn non_success_status_returns_raw_text() {
        let echo = EchoServer::start().await.unwrap();
        let gw = gateway(None);

        let url = echo.url("/status/404");
        let result = gw.request(HttpMethod::Get, &url, None, ContentType::Json).await;
        match result {
            HttpResult::Failure { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, EchoServer::status_body(404));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_and_plain_text_bodies_are_normalized() {
        let echo = EchoServer::start().await.unwrap();
        let gw = gateway(None);

        let url = echo.url("/empty");
        let empty = gw.request(HttpMethod::Delete, &url, None, ContentType::Json).await;
        assert_eq!(empty, HttpResult::Success { status: 204, body: Value::Null });

        let text = gw.request(HttpMethod::Get, &echo.url("/text"), None, ContentType::Json).await;
        assert_eq!(
            text,
            HttpResult::Success {
                status: 200,
                body: Value::String(EchoServer::PLAIN_TEXT.to_string())
            }
        );
    }

    #[tokio::test]
    async fn transport_errors_become_500_failures() {
        let gw = gateway(None);

        // Relative URLs never reach the network.
        let result = gw.request(HttpMethod::Get, "v1/Things", None, ContentType::Json).await;
        assert_eq!(
            result,
            HttpResult::Failure {
                status: 500,
                message: REQUEST_FAILED_MESSAGE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn refused_connections_become_500_failures() {
        let gw = gateway(None);
        let api = ApiDescriptor::new(HttpMethod::Post, "http://127.0.0.1:1/v1/Things/{Sid}");

        let result = gw.execute(&api, Some(fields(json!({"Sid": "TH1"})))).await;
        assert_eq!(
            result,
            HttpResult::Failure {
                status: 500,
                message: REQUEST_FAILED_MESSAGE.to_string()
            }
        );
    }
}
