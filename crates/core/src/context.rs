//! The mutable envelope threaded through every pipeline point.

use serde::{Deserialize, Serialize};

use crate::live_patch::EffectiveConfig;
use crate::llm::{LlmErrorInfo, LlmResult};
use crate::tool::{ToolCall, ToolCatalogItem, ToolResult};
use crate::turn::{ContextBlock, InstanceInfo, Step, Turn};

/// Context passed by value into each interceptor and returned (possibly
/// modified) from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepContext {
    pub instance: InstanceInfo,
    pub agent_name: String,
    /// Base swarm document.
    pub swarm_config: serde_json::Value,
    /// Base agent document.
    pub agent_config: serde_json::Value,
    pub turn: Turn,
    /// Cleared before `turn.pre` and `turn.post`.
    pub step: Option<Step>,
    pub effective_config: Option<EffectiveConfig>,
    pub tool_catalog: Vec<ToolCatalogItem>,
    pub blocks: Vec<ContextBlock>,
    pub llm_result: Option<LlmResult>,
    pub llm_error: Option<LlmErrorInfo>,
    pub tool_call: Option<ToolCall>,
    pub tool_result: Option<ToolResult>,
    /// Payload of workspace lifecycle points; `None` inside turns.
    #[serde(default)]
    pub workspace: Option<serde_json::Value>,
}

impl StepContext {
    pub fn new(
        instance: InstanceInfo,
        agent_name: impl Into<String>,
        swarm_config: serde_json::Value,
        agent_config: serde_json::Value,
        turn: Turn,
    ) -> Self {
        Self {
            instance,
            agent_name: agent_name.into(),
            swarm_config,
            agent_config,
            turn,
            step: None,
            effective_config: None,
            tool_catalog: Vec::new(),
            blocks: Vec::new(),
            llm_result: None,
            llm_error: None,
            tool_call: None,
            tool_result: None,
            workspace: None,
        }
    }

    /// Reset the per-step fields for a new step.
    pub fn begin_step(&mut self, step: Step) {
        self.step = Some(step);
        self.tool_catalog.clear();
        self.blocks.clear();
        self.llm_result = None;
        self.llm_error = None;
        self.tool_call = None;
        self.tool_result = None;
    }

    /// Effective agent document, falling back to the base document.
    pub fn agent_document(&self) -> &serde_json::Value {
        self.effective_config
            .as_ref()
            .map(|e| &e.agent)
            .unwrap_or(&self.agent_config)
    }

    /// Effective swarm document, falling back to the base document.
    pub fn swarm_document(&self) -> &serde_json::Value {
        self.effective_config
            .as_ref()
            .map(|e| &e.swarm)
            .unwrap_or(&self.swarm_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::InboundEvent;
    use serde_json::json;

    fn ctx() -> StepContext {
        StepContext::new(
            InstanceInfo {
                id: "i".into(),
                key: "k".into(),
                swarm_name: "s".into(),
            },
            "planner",
            json!({"policy": {}}),
            json!({"modelConfig": {"modelRef": "base"}}),
            Turn::new(InboundEvent::text("hi")),
        )
    }

    #[test]
    fn documents_prefer_effective_config() {
        let mut ctx = ctx();
        assert_eq!(ctx.agent_document()["modelConfig"]["modelRef"], "base");

        ctx.effective_config = Some(EffectiveConfig {
            swarm: json!({}),
            agent: json!({"modelConfig": {"modelRef": "patched"}}),
            revision: 1,
        });
        assert_eq!(ctx.agent_document()["modelConfig"]["modelRef"], "patched");
    }

    #[test]
    fn begin_step_clears_per_step_fields() {
        let mut ctx = ctx();
        ctx.llm_result = Some(LlmResult::text("old"));
        ctx.blocks.push(ContextBlock::new("system", json!("x")));
        ctx.begin_step(Step::new(1));
        assert!(ctx.llm_result.is_none());
        assert!(ctx.blocks.is_empty());
        assert_eq!(ctx.step.as_ref().map(|s| s.index), Some(1));
    }
}
