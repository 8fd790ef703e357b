//! Field ownership of [`StepContext`] per pipeline point.
//!
//! Interceptors receive the whole context, but a point may only change the
//! fields it is responsible for. [`accept_changes`] takes the context as it
//! was before the point ran and the context an interceptor chain returned,
//! and keeps only the permitted changes:
//!
//! | field               | writable at                          |
//! |---------------------|--------------------------------------|
//! | `effective_config`  | `step.config`                        |
//! | `tool_catalog`      | `step.tools`                         |
//! | `blocks`            | `step.blocks`                        |
//! | `llm_result`        | `step.llmCall`, `step.llmError`      |
//! | `tool_call`         | `toolCall.pre`                       |
//! | `tool_result`       | `toolCall.exec`, `toolCall.post`     |
//! | `turn.messages`     | `turn.post` (append only)            |
//! | `workspace`         | workspace points                     |
//! | `turn.metadata.extra` | every point                        |
//!
//! Everything else (instance, agent, base documents, step, turn identity,
//! status, summary, steps, tool results, loop-owned metadata) is restored.

use swarmloop_core::StepContext;

use crate::point::PipelinePoint;

pub fn accept_changes(point: PipelinePoint, before: &StepContext, after: StepContext) -> StepContext {
    let StepContext {
        effective_config,
        tool_catalog,
        blocks,
        llm_result,
        tool_call,
        tool_result,
        workspace,
        turn,
        ..
    } = after;

    let mut ctx = before.clone();
    ctx.turn.metadata.extra = turn.metadata.extra;

    if point == PipelinePoint::TurnPost && turn.messages.starts_with(&before.turn.messages) {
        ctx.turn.messages = turn.messages;
    }

    match point {
        PipelinePoint::StepConfig => ctx.effective_config = effective_config,
        PipelinePoint::StepTools => ctx.tool_catalog = tool_catalog,
        PipelinePoint::StepBlocks => ctx.blocks = blocks,
        PipelinePoint::StepLlmCall | PipelinePoint::StepLlmError => ctx.llm_result = llm_result,
        PipelinePoint::ToolCallPre => ctx.tool_call = tool_call,
        PipelinePoint::ToolCallExec | PipelinePoint::ToolCallPost => ctx.tool_result = tool_result,
        PipelinePoint::WorkspaceRepoAvailable | PipelinePoint::WorkspaceWorktreeMounted => {
            ctx.workspace = workspace
        }
        PipelinePoint::TurnPre
        | PipelinePoint::StepPre
        | PipelinePoint::StepPost
        | PipelinePoint::TurnPost => {}
    }
    ctx
}
