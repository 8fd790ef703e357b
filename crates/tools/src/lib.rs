//! # Swarmloop Tools
//!
//! Everything between a model-requested tool call and its structured result:
//! - [`ToolRegistry`] and [`DynamicToolSet`] hold local and extension handlers
//! - [`RemoteToolManager`] keeps remote tool servers attached
//! - [`build_tool_catalog`] merges the three sources for a step
//! - [`ToolExecutor`] runs one call through the `toolCall.*` points

pub mod catalog;
pub mod executor;
pub mod registry;
pub mod remote;
pub mod schema;

pub use catalog::{build_tool_catalog, static_tools};
pub use executor::{DEFAULT_ERROR_MESSAGE_LIMIT, ToolExecutor, truncate_error_message};
pub use registry::{DynamicToolSet, ToolDefinition, ToolRegistry};
pub use remote::{
    NoRemoteConnector, RemoteConnector, RemoteToolDefinition, RemoteToolManager, RemoteToolServer,
    server_identity,
};
