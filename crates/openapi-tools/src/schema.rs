//! Tool input schemas.
//!
//! Only a shallow view of JSON Schema is kept: primitive types, arrays with their item type, and
//! objects with one level of properties. Anything deeper collapses to its bare JSON type.

use openapiv3::{ReferenceOr, Schema, SchemaKind, Type};
use rmcp::model::JsonObject;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// JSON Schema `type` keyword values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl JsonType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaShape {
    Primitive(JsonType),
    Array(Box<SchemaShape>),
    Object {
        properties: BTreeMap<String, SchemaShape>,
        required: Vec<String>,
    },
}

impl Default for SchemaShape {
    fn default() -> Self {
        Self::Primitive(JsonType::String)
    }
}

impl SchemaShape {
    /// Shape of an `OpenAPI` schema, descending at most one level into arrays and objects.
    ///
    /// Unresolved references and schemas without a declared type are treated as strings.
    #[must_use]
    pub fn from_openapi(schema: &ReferenceOr<Schema>) -> Self {
        match schema {
            ReferenceOr::Item(s) => Self::from_schema(s, true),
            ReferenceOr::Reference { .. } => Self::default(),
        }
    }

    /// Shape of an object property schema (`properties` values are boxed in `openapiv3`).
    #[must_use]
    pub fn from_property(schema: &ReferenceOr<Box<Schema>>) -> Self {
        Self::from_boxed(schema, true)
    }

    fn from_boxed(schema: &ReferenceOr<Box<Schema>>, descend: bool) -> Self {
        match schema {
            ReferenceOr::Item(s) => Self::from_schema(s, descend),
            ReferenceOr::Reference { .. } => Self::default(),
        }
    }

    fn from_schema(schema: &Schema, descend: bool) -> Self {
        let SchemaKind::Type(ty) = &schema.schema_kind else {
            return Self::default();
        };
        match ty {
            Type::String(_) => Self::Primitive(JsonType::String),
            Type::Number(_) => Self::Primitive(JsonType::Number),
            Type::Integer(_) => Self::Primitive(JsonType::Integer),
            Type::Boolean(_) => Self::Primitive(JsonType::Boolean),
            Type::Array(_) | Type::Object(_) if !descend => Self::Primitive(match ty {
                Type::Array(_) => JsonType::Array,
                _ => JsonType::Object,
            }),
            Type::Array(a) => Self::Array(Box::new(
                a.items
                    .as_ref()
                    .map(|items| Self::from_boxed(items, false))
                    .unwrap_or_default(),
            )),
            Type::Object(o) => Self::Object {
                properties: o
                    .properties
                    .iter()
                    .map(|(name, prop)| (name.clone(), Self::from_boxed(prop, false)))
                    .collect(),
                required: o.required.clone(),
            },
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Primitive(t) => json!({"type": t.as_str()}),
            Self::Array(items) => json!({"type": "array", "items": items.to_json()}),
            Self::Object {
                properties,
                required,
            } => {
                let mut out = json!({"type": "object"});
                if !properties.is_empty() {
                    out["properties"] = properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_json()))
                        .collect::<serde_json::Map<_, _>>()
                        .into();
                }
                let required: Vec<&String> =
                    required.iter().filter(|r| properties.contains_key(*r)).collect();
                if !required.is_empty() {
                    out["required"] = json!(required);
                }
                out
            }
        }
    }
}

/// The `description` of an inline schema, if any.
#[must_use]
pub fn description_of(schema: &Schema) -> Option<&str> {
    schema.schema_data.description.as_deref()
}

/// One property of a tool's input schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub shape: SchemaShape,
    pub description: String,
}

impl Property {
    /// Build a property, synthesizing `"{name} parameter"` when no description is declared.
    #[must_use]
    pub fn new(name: &str, shape: SchemaShape, description: Option<&str>) -> Self {
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map_or_else(|| format!("{name} parameter"), ToString::to_string);
        Self { shape, description }
    }

    fn to_json(&self) -> Value {
        let mut out = self.shape.to_json();
        out["description"] = json!(self.description);
        out
    }
}

/// `{ "type": "object", "properties": ..., "required": [...] }` for one tool.
///
/// `required` only ever names declared properties, once each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSchema {
    properties: BTreeMap<String, Property>,
    required: Vec<String>,
}

impl InputSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a property; `required` marks it required.
    pub fn insert(&mut self, name: impl Into<String>, property: Property, required: bool) {
        let name = name.into();
        if required {
            self.mark_required(&name);
        }
        self.properties.insert(name, property);
    }

    /// Add `name` to the required list. Names that are never declared are dropped on output.
    pub fn mark_required(&mut self, name: &str) {
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .filter(|r| self.properties.contains_key(*r))
            .map(String::as_str)
    }

    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required().any(|r| r == name)
    }

    /// Remove `name` from the required list, keeping the property.
    pub fn make_optional(&mut self, name: &str) {
        self.required.retain(|r| r != name);
    }

    #[must_use]
    pub fn to_json(&self) -> JsonObject {
        let properties: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, p)| (k.clone(), p.to_json()))
            .collect();
        let required: Vec<&str> = self.required().collect();

        let mut out = JsonObject::new();
        out.insert("type".to_string(), json!("object"));
        out.insert("properties".to_string(), Value::Object(properties));
        out.insert("required".to_string(), json!(required));
        out
    }
}
