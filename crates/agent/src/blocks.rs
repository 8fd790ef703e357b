//! Default context blocks and the model request built from a step context.

use serde_json::{Value, json};

use swarmloop_core::{ContextBlock, LlmRequest, StepContext};

pub const SYSTEM_BLOCK: &str = "system";
pub const AUTH_PENDING_BLOCK: &str = "auth.pending";

/// Blocks rendered before `step.blocks` mutators run.
///
/// A `system` block from `/prompts/system` of the effective agent document,
/// and an `auth.pending` block while tool calls wait for authorization.
pub fn default_blocks(ctx: &StepContext) -> Vec<ContextBlock> {
    let mut blocks = Vec::new();

    if let Some(system) = ctx.agent_document().pointer("/prompts/system").and_then(Value::as_str) {
        blocks.push(ContextBlock::new(SYSTEM_BLOCK, json!(system)));
    }

    let pending = &ctx.turn.metadata.auth_pending;
    if !pending.is_empty() {
        let items: Vec<Value> = pending
            .iter()
            .map(|result| {
                json!({
                    "toolCallId": result.id,
                    "toolName": result.name,
                    "output": result.output,
                })
            })
            .collect();
        blocks.push(ContextBlock::new(AUTH_PENDING_BLOCK, json!({ "items": items })));
    }

    blocks
}

/// `/modelConfig/modelRef` as a plain name. Object references yield their name.
fn model_ref(agent: &Value) -> Option<String> {
    match agent.pointer("/modelConfig/modelRef")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Everything the language model sees for the current step.
pub fn model_request(ctx: &StepContext) -> LlmRequest {
    let agent = ctx.agent_document();
    let (step_id, step_index) = ctx
        .step
        .as_ref()
        .map(|s| (s.id.clone(), s.index))
        .unwrap_or_default();

    LlmRequest {
        model: model_ref(agent),
        params: agent.pointer("/modelConfig/params").cloned().unwrap_or(Value::Null),
        blocks: ctx.blocks.clone(),
        messages: ctx.turn.messages.clone(),
        catalog: ctx.tool_catalog.clone(),
        turn_id: ctx.turn.id.clone(),
        step_id,
        step_index,
        effective_config: ctx.effective_config.clone().unwrap_or_default(),
    }
}
