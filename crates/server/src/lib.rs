//! MCP server exposing OpenAPI-described REST operations as tools.
//!
//! Specs are loaded from a directory, compiled into a tool catalog, and every tool call is
//! executed as an HTTP request through the gateway. Behaviour can be specialized with
//! [`ServerHooks`] and extended with [`AdditionalTool`]s.

pub mod account;
pub mod additional;
pub mod capability;
pub mod cli;
pub mod credentials;
pub mod error;
pub mod hooks;
pub mod server;

pub use account::AccountScopedHooks;
pub use additional::{AdditionalTool, AdditionalToolHandler, AdditionalTools, PassthroughHandler};
pub use capability::{Capability, CapabilitySet};
pub use credentials::{CredentialStore, Credentials, FileCredentialStore};
pub use error::{Result, ServerError};
pub use hooks::{CapabilityRegistry, DefaultHooks, ServerHooks};
pub use server::{OpenApiMcpServer, ServerConfig};
