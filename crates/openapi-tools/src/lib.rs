//! OpenAPI->MCP tooling.
//!
//! - [`spec`]: scan a directory of `OpenAPI` documents into dereferenced [`SpecRecord`]s
//! - [`compiler`]: turn spec records into a paired tool/API [`Catalog`]
//!
//! It intentionally knows nothing about the MCP server lifecycle or downstream HTTP execution.

pub mod compiler;
pub mod error;
pub mod resolver;
pub mod schema;
pub mod spec;

pub use compiler::{Catalog, ToolCompiler, ToolDefinition, ToolFilters};
pub use error::{OpenApiToolsError, Result};
pub use schema::{InputSchema, JsonType, Property, SchemaShape};
pub use spec::{ServiceSegments, SpecRecord, SpecRepository, load_specs};
