//! Tool call/result types, catalog entries and the handler trait.
//!
//! A tool call arrives from the language model; the executor resolves it to a
//! [`ToolHandler`] through the step's catalog and produces a [`ToolResult`]
//! whose output always carries a `status` tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::error::ToolError;
use crate::event::EventPort;
use crate::live_patch::LiveConfigPort;
use crate::oauth::ScopedTokens;
use crate::turn::{InstanceInfo, Step, Turn};

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Outcome tag carried in `output.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
    AuthorizationRequired,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Ok => "ok",
            ToolStatus::Error => "error",
            ToolStatus::AuthorizationRequired => "authorization_required",
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
    /// Structured output; always an object with a `status` field.
    pub output: serde_json::Value,
}

impl ToolResult {
    /// Build a result for `call`, normalizing the handler output so it carries
    /// a status tag. Outputs without one are wrapped as `{status: "ok", result}`.
    pub fn from_output(call: &ToolCall, output: serde_json::Value) -> Self {
        let output = match output {
            serde_json::Value::Object(map) if map.get("status").is_some_and(|s| s.is_string()) => {
                serde_json::Value::Object(map)
            }
            other => serde_json::json!({ "status": "ok", "result": other }),
        };
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
            output,
        }
    }

    /// An error result `{status: "error", error: {name, message, code}}`.
    pub fn error(call: &ToolCall, name: &str, message: impl Into<String>, code: &str) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
            output: serde_json::json!({
                "status": "error",
                "error": {
                    "name": name,
                    "message": message.into(),
                    "code": code,
                }
            }),
        }
    }

    /// The status tag. Unknown tags read as errors.
    pub fn status(&self) -> ToolStatus {
        match self.output.get("status").and_then(|s| s.as_str()) {
            None | Some("ok") => ToolStatus::Ok,
            Some("authorization_required") => ToolStatus::AuthorizationRequired,
            Some(_) => ToolStatus::Error,
        }
    }
}

/// Where a catalog entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToolSource {
    /// An export of a statically declared `Tool` resource.
    Static { tool: String },
    /// Registered at runtime by an extension.
    Extension { extension: String },
    /// Provided by a synced remote tool server.
    Remote { server: String, tool: String },
}

/// One entry of the per-step tool catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCatalogItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema describing the parameters
    pub parameters: serde_json::Value,
    pub source: ToolSource,
}

/// Default parameter schema for tools that declare none.
pub fn open_parameters_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "additionalProperties": true })
}

/// Everything a handler may reach while executing one call.
#[derive(Clone)]
pub struct ToolContext {
    pub agent_name: String,
    pub instance: InstanceInfo,
    /// Snapshot of the turn at the time of the call.
    pub turn: Turn,
    /// Snapshot of the step at the time of the call.
    pub step: Step,
    pub catalog: Vec<ToolCatalogItem>,
    pub events: Arc<EventPort>,
    pub live_config: Arc<dyn LiveConfigPort>,
    pub tokens: ScopedTokens,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("agent_name", &self.agent_name)
            .field("turn_id", &self.turn.id)
            .field("step_id", &self.step.id)
            .finish_non_exhaustive()
    }
}

/// A concrete tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool. Errors are converted into error results by the executor.
    async fn call(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(F);

/// Wrap an async closure `(input, ctx) -> Result<Value, ToolError>` as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<serde_json::Value, ToolError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<serde_json::Value, ToolError>> + Send + 'static,
{
    async fn call(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        (self.0)(input, ctx.clone()).await
    }
}
