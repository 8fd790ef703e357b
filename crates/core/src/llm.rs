//! LanguageModel trait: the abstraction over the model collaborator.
//!
//! The engine hands the model everything it needs for one step (blocks,
//! messages, catalog, effective configuration) and gets back either text or
//! a list of tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::live_patch::EffectiveConfig;
use crate::tool::{ToolCall, ToolCatalogItem};
use crate::turn::{ContextBlock, TurnMessage};

/// Everything the model sees for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    /// Model reference from `/modelConfig/modelRef` of the agent document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Model params from `/modelConfig/params`.
    #[serde(default)]
    pub params: serde_json::Value,

    pub blocks: Vec<ContextBlock>,
    pub messages: Vec<TurnMessage>,
    pub catalog: Vec<ToolCatalogItem>,
    pub turn_id: String,
    pub step_id: String,
    pub step_index: u32,
    pub effective_config: EffectiveConfig,
}

/// A model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Provider-specific metadata (usage, finish reason, ...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl LlmResult {
    /// A plain text answer with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A response requesting tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }
}

/// The model failure handed to `step.llmError` interceptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmErrorInfo {
    pub message: String,
    /// Number of retries already performed for this step.
    pub retry_count: u32,
}

/// The language-model collaborator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable model backend name.
    fn name(&self) -> &str;

    /// Run one model request.
    async fn complete(&self, request: LlmRequest) -> std::result::Result<LlmResult, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_result_has_no_tool_calls() {
        let result = LlmResult::text("Hello!");
        assert_eq!(result.content.as_deref(), Some("Hello!"));
        assert!(result.tool_calls.is_empty());
    }

    #[test]
    fn result_deserializes_from_camel_case() {
        let result: LlmResult = serde_json::from_value(serde_json::json!({
            "toolCalls": [{"id": "c1", "name": "search", "input": {"q": "x"}}]
        }))
        .unwrap();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "search");
        assert!(result.content.is_none());
    }
}
