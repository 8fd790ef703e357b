//! Turn and Step: the units of work of an agent instance.
//!
//! A [`Turn`] is created once per dequeued [`InboundEvent`] and runs a bounded
//! loop of [`Step`]s. A step is never mutated after `step.post`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::LlmResult;
use crate::tool::{ToolCall, ToolResult};

/// Identity of the running swarm instance an agent belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub id: String,
    pub key: String,
    pub swarm_name: String,
}

/// The principal that caused a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Token subjects the actor may act under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subjects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Caller identity and claims attached to an inbound event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    #[serde(default)]
    pub subjects: Subjects,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// An event waiting in an agent instance queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEvent {
    pub input: String,
    /// Opaque channel metadata.
    #[serde(default)]
    pub origin: serde_json::Value,
    #[serde(default)]
    pub auth: TurnAuth,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl InboundEvent {
    pub fn text(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn with_auth(mut self, auth: TurnAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_origin(mut self, origin: serde_json::Value) -> Self {
        self.origin = origin;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl TurnStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnStatus::Completed | TurnStatus::Failed | TurnStatus::Interrupted
        )
    }
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnStatus::Pending => "pending",
            TurnStatus::Running => "running",
            TurnStatus::Completed => "completed",
            TurnStatus::Failed => "failed",
            TurnStatus::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Error details recorded when a turn fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
}

/// The open per-turn metadata bag.
///
/// The typed fields are owned by the loop; `extra` is free for interceptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_reason: Option<String>,
    #[serde(default)]
    pub step_limit_reached: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_pending: Vec<ToolResult>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// One entry of the turn's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl TurnMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(result: &ToolResult) -> Self {
        Self {
            role: MessageRole::Tool,
            content: result.output.to_string(),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.id.clone()),
        }
    }
}

/// One iteration of the model-call/tool-call loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub index: u32,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
    #[serde(default)]
    pub llm_result: Option<LlmResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(index: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            index,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            llm_result: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// One complete request/response cycle of an agent instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub input: String,
    #[serde(default)]
    pub origin: serde_json::Value,
    #[serde(default)]
    pub auth: TurnAuth,
    pub status: TurnStatus,
    /// Final assistant text, set when the model stops calling tools.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub messages: Vec<TurnMessage>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
    #[serde(default)]
    pub metadata: TurnMetadata,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Turn {
    /// Create a pending turn for a dequeued event.
    pub fn new(event: InboundEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input: event.input,
            origin: event.origin,
            auth: event.auth,
            status: TurnStatus::Pending,
            summary: None,
            messages: Vec::new(),
            steps: Vec::new(),
            tool_results: Vec::new(),
            metadata: TurnMetadata {
                extra: event.metadata,
                ..Default::default()
            },
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to a terminal status and stamp the completion time.
    pub fn finish(&mut self, status: TurnStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

/// A rendered piece of prompt context handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ContextBlock {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}
