//! OpenAPI->tool compilation.
//!
//! Every surfaced operation yields a [`ToolDefinition`] and an [`ApiDescriptor`] stored under the
//! same catalog key, `"{canonical service name}--{operationId}"`. The tool's name is its key.

use crate::schema::{InputSchema, Property, SchemaShape, description_of};
use crate::spec::SpecRecord;
use oapi_mcp_http_tools::semantics::annotations_for_method;
use oapi_mcp_http_tools::{ApiDescriptor, ContentType, HttpMethod};
use openapiv3::{Parameter, ParameterSchemaOrContent, ReferenceOr, Schema, SchemaKind, Type};
use regex::Regex;
use rmcp::model::{Tool, ToolAnnotations};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// Predicate over a spec record, applied after the service allow-list.
pub type SpecPredicate = dyn Fn(&SpecRecord) -> bool + Send + Sync;

/// Selects which services and operations become tools.
///
/// Empty allow-lists mean "no restriction".
#[derive(Clone, Default)]
pub struct ToolFilters {
    pub services: Vec<String>,
    pub tags: Vec<String>,
    pub predicate: Option<Arc<SpecPredicate>>,
}

impl fmt::Debug for ToolFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolFilters")
            .field("services", &self.services)
            .field("tags", &self.tags)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl ToolFilters {
    #[must_use]
    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&SpecRecord) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn includes_spec(&self, spec: &SpecRecord) -> bool {
        (self.services.is_empty() || self.services.iter().any(|s| *s == spec.service))
            && self.predicate.as_ref().is_none_or(|p| p(spec))
    }

    #[must_use]
    pub fn includes_tags(&self, tags: &[String]) -> bool {
        self.tags.is_empty() || tags.iter().any(|t| self.tags.contains(t))
    }
}

/// The protocol-facing half of a catalog entry.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
    pub annotations: Option<ToolAnnotations>,
}

impl ToolDefinition {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            annotations: None,
        }
    }

    #[must_use]
    pub fn to_mcp_tool(&self) -> Tool {
        let mut tool = Tool::new(
            self.name.clone(),
            self.description.clone(),
            Arc::new(self.input_schema.to_json()),
        );
        tool.annotations.clone_from(&self.annotations);
        tool
    }
}

/// Tool definitions and API descriptors, paired 1:1 by key.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: BTreeMap<String, ToolDefinition>,
    apis: BTreeMap<String, ApiDescriptor>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tool/API pair, replacing any pair already stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, tool: ToolDefinition, api: ApiDescriptor) {
        let key = key.into();
        self.apis.insert(key.clone(), api);
        self.tools.insert(key, tool);
    }

    /// `base`, or `base_1`, `base_2`, ... whichever is not yet taken.
    #[must_use]
    pub fn reserve_key(&self, base: &str) -> String {
        if !self.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<(&ToolDefinition, &ApiDescriptor)> {
        Some((self.tools.get(key)?, self.apis.get(key)?))
    }

    #[must_use]
    pub fn tool(&self, key: &str) -> Option<&ToolDefinition> {
        self.tools.get(key)
    }

    #[must_use]
    pub fn api(&self, key: &str) -> Option<&ApiDescriptor> {
        self.apis.get(key)
    }

    pub fn tool_mut(&mut self, key: &str) -> Option<&mut ToolDefinition> {
        self.tools.get_mut(key)
    }

    pub fn tools_mut(&mut self) -> impl Iterator<Item = (&str, &mut ToolDefinition)> {
        self.tools.iter_mut().map(|(k, t)| (k.as_str(), t))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolDefinition, &ApiDescriptor)> {
        self.tools
            .iter()
            .filter_map(|(k, t)| self.apis.get(k).map(|a| (k.as_str(), t, a)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.tools.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Split into the tool catalog and the API catalog.
    #[must_use]
    pub fn into_parts(self) -> (BTreeMap<String, ToolDefinition>, BTreeMap<String, ApiDescriptor>) {
        (self.tools, self.apis)
    }
}

/// Compiles spec records into a [`Catalog`].
#[derive(Debug, Clone, Default)]
pub struct ToolCompiler {
    filters: ToolFilters,
}

impl ToolCompiler {
    #[must_use]
    pub fn new(filters: ToolFilters) -> Self {
        Self { filters }
    }

    #[must_use]
    pub fn filters(&self) -> &ToolFilters {
        &self.filters
    }

    /// Compile every included operation. Never fails: malformed operations fall back to
    /// defaults (string types, synthesized descriptions, JSON bodies).
    #[must_use]
    pub fn compile(&self, specs: &[SpecRecord]) -> Catalog {
        let mut catalog = Catalog::new();
        for spec in specs.iter().filter(|s| self.filters.includes_spec(s)) {
            self.compile_spec(spec, &mut catalog);
        }
        info!(tools = catalog.len(), specs = specs.len(), "Compiled tool catalog");
        catalog
    }

    fn compile_spec(&self, spec: &SpecRecord, catalog: &mut Catalog) {
        let Some(paths) = spec.paths().filter(|p| !p.is_empty()) else {
            debug!(service = %spec.service, "Spec declares no paths");
            return;
        };
        let doc_base = spec.server_url();

        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                debug!(service = %spec.service, path = %path, "Skipping malformed path item");
                continue;
            };
            let base = first_server_url(item).or(doc_base).unwrap_or_default();
            let url = join_url(base, path);
            let path_params = parse_parameters(item.get("parameters"));

            for method in HttpMethod::ALL {
                let field = method.as_str().to_ascii_lowercase();
                let Some(op) = item.get(&field).and_then(Value::as_object) else {
                    continue;
                };
                if !self.filters.includes_tags(&string_list(op.get("tags"))) {
                    continue;
                }

                let operation_id = non_empty(op.get("operationId").and_then(Value::as_str))
                    .map_or_else(|| canonical_operation_name(method, path), ToString::to_string);
                let key = catalog.reserve_key(&format!("{}--{operation_id}", spec.name));

                let op_params = parse_parameters(op.get("parameters"));
                let (input_schema, content_type) = build_input(&path_params, &op_params, op);
                let mut tool = ToolDefinition::new(
                    key.clone(),
                    describe(spec, method, path, op),
                    input_schema,
                );
                tool.annotations = Some(annotations_for_method(method));
                let api = ApiDescriptor::new(method, url.clone()).with_content_type(content_type);

                debug!(key = %key, %method, url = %url, "Compiled tool");
                catalog.insert(key, tool, api);
            }
        }
    }
}

/// `trim(base, '/') + "/" + trim(path, '/')`.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_matches('/'), path.trim_matches('/'))
}

/// `servers[0].url` of a document or path item.
pub(crate) fn first_server_url(node: &Map<String, Value>) -> Option<&str> {
    node.get("servers")?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn describe(spec: &SpecRecord, method: HttpMethod, path: &str, op: &Map<String, Value>) -> String {
    let operation = non_empty(op.get("description").and_then(Value::as_str))
        .map_or_else(|| format!("Make a {method} request to {path}"), ToString::to_string);

    match non_empty(spec.description()) {
        Some(service) => format!(
            "{}: {}. {operation}",
            spec.title(),
            service.strip_suffix('.').unwrap_or(service)
        ),
        None => format!("{}: {operation}", spec.title()),
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_parameters(value: Option<&Value>) -> Vec<Parameter> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(parse_parameter)
        .collect()
}

/// A parameter needs a `name` and an `in`. A missing or unreadable `schema` is typed as a string.
fn parse_parameter(raw: &Value) -> Option<Parameter> {
    let mut fields = raw.as_object()?.clone();
    let name = non_empty(fields.get("name").and_then(Value::as_str))?.to_string();
    if fields.get("in").and_then(Value::as_str).is_none() {
        debug!(parameter = %name, "Skipping parameter without a location");
        return None;
    }
    if !fields.contains_key("schema") && !fields.contains_key("content") {
        fields.insert("schema".to_string(), json!({"type": "string"}));
    }

    serde_json::from_value(Value::Object(fields.clone()))
        .or_else(|_| {
            fields.remove("content");
            fields.insert("schema".to_string(), json!({"type": "string"}));
            serde_json::from_value(Value::Object(fields))
        })
        .map_err(|e| debug!(parameter = %name, error = %e, "Skipping malformed parameter"))
        .ok()
}

fn build_input(
    path_params: &[Parameter],
    op_params: &[Parameter],
    op: &Map<String, Value>,
) -> (InputSchema, ContentType) {
    let mut schema = InputSchema::new();

    for param in merged_parameters(path_params, op_params) {
        if matches!(param, Parameter::Cookie { .. }) {
            continue;
        }
        let data = param.parameter_data_ref();
        let (shape, schema_description) = match &data.format {
            ParameterSchemaOrContent::Schema(s) => (
                SchemaShape::from_openapi(s),
                s.as_item().and_then(description_of),
            ),
            ParameterSchemaOrContent::Content(_) => (SchemaShape::default(), None),
        };
        let description = non_empty(data.description.as_deref()).or(schema_description);
        schema.insert(
            data.name.clone(),
            Property::new(&data.name, shape, description),
            data.required,
        );
    }

    let mut content_type = ContentType::Json;
    if let Some((ct, body)) = request_body_schema(op) {
        content_type = ct;
        if let Some(body) = body.as_ref().and_then(ReferenceOr::as_item) {
            let mut properties = Vec::new();
            let mut required = Vec::new();
            collect_object_members(body, &mut properties, &mut required);

            for (name, prop) in properties {
                let description = prop.as_item().and_then(|s| description_of(s));
                schema.insert(
                    name,
                    Property::new(name, SchemaShape::from_property(prop), description),
                    false,
                );
            }
            for name in required {
                schema.mark_required(name);
            }
        }
    }

    (schema, content_type)
}

/// Path-item parameters overridden by operation parameters with the same name and location.
fn merged_parameters<'a>(
    path_params: &'a [Parameter],
    op_params: &'a [Parameter],
) -> Vec<&'a Parameter> {
    let mut merged: Vec<&Parameter> = Vec::new();
    let mut index: HashMap<(&'static str, &str), usize> = HashMap::new();

    for p in path_params.iter().chain(op_params) {
        let key = (location(p), p.parameter_data_ref().name.as_str());
        if let Some(i) = index.get(&key).copied() {
            merged[i] = p;
        } else {
            index.insert(key, merged.len());
            merged.push(p);
        }
    }
    merged
}

fn location(p: &Parameter) -> &'static str {
    match p {
        Parameter::Path { .. } => "path",
        Parameter::Query { .. } => "query",
        Parameter::Header { .. } => "header",
        Parameter::Cookie { .. } => "cookie",
    }
}

/// Form-urlencoded content wins over JSON, which wins over multipart. The schema is `None` when
/// it is absent or unreadable; the content type still applies.
fn request_body_schema(
    op: &Map<String, Value>,
) -> Option<(ContentType, Option<ReferenceOr<Schema>>)> {
    let content = op.get("requestBody")?.get("content")?.as_object()?;
    let preference = [ContentType::FormUrlEncoded, ContentType::Json, ContentType::Multipart];
    let (content_type, media) = preference
        .into_iter()
        .find_map(|wanted| {
            content
                .iter()
                .find(|(mime, _)| ContentType::from_mime(mime) == Some(wanted))
                .map(|(_, media)| (wanted, media))
        })?;

    let schema = media.get("schema").and_then(|raw| {
        serde_json::from_value(raw.clone())
            .map_err(|e| debug!(%content_type, error = %e, "Ignoring unreadable body schema"))
            .ok()
    });
    Some((content_type, schema))
}

fn collect_object_members<'a>(
    schema: &'a Schema,
    properties: &mut Vec<(&'a str, &'a ReferenceOr<Box<Schema>>)>,
    required: &mut Vec<&'a str>,
) {
    match &schema.schema_kind {
        SchemaKind::Type(Type::Object(o)) => {
            properties.extend(o.properties.iter().map(|(k, v)| (k.as_str(), v)));
            required.extend(o.required.iter().map(String::as_str));
        }
        SchemaKind::Any(a) => {
            properties.extend(a.properties.iter().map(|(k, v)| (k.as_str(), v)));
            required.extend(a.required.iter().map(String::as_str));
        }
        SchemaKind::AllOf { all_of } => {
            for part in all_of.iter().filter_map(ReferenceOr::as_item) {
                collect_object_members(part, properties, required);
            }
        }
        _ => {}
    }
}

static PATH_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("path param pattern is valid"));
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("non-alnum pattern is valid"));

/// Fallback operation id: `get_pets_petId` for `GET /pets/{petId}`.
fn canonical_operation_name(method: HttpMethod, path: &str) -> String {
    let name = format!("{}_{path}", method.as_str().to_lowercase());
    let name = PATH_PARAM.replace_all(&name, "_$1");
    let name = NON_ALNUM.replace_all(&name, "_");
    let mut name = name.trim_matches('_').to_string();
    if name.len() > 64 {
        name.truncate(64);
    }
    name
}
