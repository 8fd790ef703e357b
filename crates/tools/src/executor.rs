//! ToolExecutor: runs one tool call through `toolCall.pre`, the wrapped
//! `toolCall.exec` and `toolCall.post`.
//!
//! Handler failures never escape: they become `{status: "error"}` results so
//! one failing tool cannot fail the step. Only interceptor errors propagate.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use swarmloop_core::oauth::UnconfiguredOAuth;
use swarmloop_core::{
    EventPort, LiveConfigPort, Result, ScopedTokens, Step, StepContext, TokenAccessor, TokenScope,
    ToolCall, ToolContext, ToolError, ToolHandler, ToolResult, ToolSource, ToolStatus,
};
use swarmloop_pipeline::{PipelineManager, PipelinePoint, accept_changes};

use crate::registry::{DynamicToolSet, ToolRegistry};
use crate::remote::RemoteToolManager;
use crate::schema::validate_arguments;

/// Default limit, in characters, for error messages placed in tool results.
pub const DEFAULT_ERROR_MESSAGE_LIMIT: usize = 1000;

const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Cut `message` to at most `limit` characters, marking the cut.
pub fn truncate_error_message(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }
    let suffix_len = TRUNCATION_SUFFIX.chars().count();
    if limit <= suffix_len {
        return message.chars().take(limit).collect();
    }
    let mut out: String = message.chars().take(limit - suffix_len).collect();
    out.push_str(TRUNCATION_SUFFIX);
    out
}

/// Executes tool calls for one agent.
#[derive(Clone)]
pub struct ToolExecutor {
    local: Arc<ToolRegistry>,
    dynamic: Arc<DynamicToolSet>,
    remote: Arc<RemoteToolManager>,
    events: Arc<EventPort>,
    live_config: Arc<dyn LiveConfigPort>,
    tokens: Arc<dyn TokenAccessor>,
    error_message_limit: usize,
}

impl ToolExecutor {
    pub fn new(
        local: Arc<ToolRegistry>,
        dynamic: Arc<DynamicToolSet>,
        remote: Arc<RemoteToolManager>,
        events: Arc<EventPort>,
        live_config: Arc<dyn LiveConfigPort>,
    ) -> Self {
        Self {
            local,
            dynamic,
            remote,
            events,
            live_config,
            tokens: Arc::new(UnconfiguredOAuth),
            error_message_limit: DEFAULT_ERROR_MESSAGE_LIMIT,
        }
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn TokenAccessor>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_error_message_limit(mut self, limit: usize) -> Self {
        self.error_message_limit = limit;
        self
    }

    pub fn dynamic(&self) -> &Arc<DynamicToolSet> {
        &self.dynamic
    }

    pub fn remote(&self) -> &Arc<RemoteToolManager> {
        &self.remote
    }

    /// Execute `call` against the catalog in `ctx`.
    ///
    /// On return `ctx.tool_call` and `ctx.tool_result` hold the final call and
    /// its result; the result id always equals `call.id`. Results with status
    /// `authorization_required` are also queued on `turn.metadata.auth_pending`.
    pub async fn execute_tool_call(
        &self,
        pipeline: &PipelineManager,
        call: ToolCall,
        mut ctx: StepContext,
    ) -> Result<StepContext> {
        let call_id = call.id.clone();
        ctx.tool_call = Some(call.clone());
        ctx.tool_result = None;

        let before = ctx.clone();
        let ctx = pipeline.run_mutators(PipelinePoint::ToolCallPre, ctx).await?;
        let mut ctx = accept_changes(PipelinePoint::ToolCallPre, &before, ctx);
        let call = ctx.tool_call.clone().unwrap_or(call);

        match self.precheck(&call, &ctx) {
            Some(rejected) => ctx.tool_result = Some(rejected),
            None => {
                let before = ctx.clone();
                let this = self.clone();
                let out = pipeline
                    .run_wrapped(PipelinePoint::ToolCallExec, ctx, move |ctx| {
                        let this = this.clone();
                        async move { Ok(this.invoke(ctx).await) }
                    })
                    .await?;
                ctx = accept_changes(PipelinePoint::ToolCallExec, &before, out);
            }
        }

        if ctx.tool_result.is_none() {
            ctx.tool_result = Some(ToolResult::error(
                &call,
                "ToolNoResultError",
                format!("Tool '{}' produced no result", call.name),
                "E_TOOL_NO_RESULT",
            ));
        }

        let before = ctx.clone();
        let out = pipeline.run_mutators(PipelinePoint::ToolCallPost, ctx).await?;
        let mut ctx = accept_changes(PipelinePoint::ToolCallPost, &before, out);

        let result = ctx.tool_result.get_or_insert_with(|| {
            ToolResult::error(&call, "ToolNoResultError", "Tool result was removed", "E_TOOL_NO_RESULT")
        });
        result.id = call_id;
        let status = result.status();
        debug!(tool = %result.name, status = status.as_str(), "Tool call finished");
        if status == ToolStatus::AuthorizationRequired {
            info!(tool = %result.name, "Tool requires authorization");
            let pending = result.clone();
            ctx.turn.metadata.auth_pending.push(pending);
        }
        Ok(ctx)
    }

    /// Catalog membership and argument checks run before `toolCall.exec`.
    fn precheck(&self, call: &ToolCall, ctx: &StepContext) -> Option<ToolResult> {
        let Some(item) = ctx.tool_catalog.iter().find(|i| i.name == call.name) else {
            warn!(tool = %call.name, "Tool call not in catalog");
            return Some(ToolResult::error(
                call,
                "ToolNotInCatalogError",
                format!("Tool '{}' is not available in the current tool catalog.", call.name),
                "E_TOOL_NOT_IN_CATALOG",
            ));
        };
        validate_arguments(&call.name, &call.input, &item.parameters)
            .err()
            .map(|message| {
                ToolResult::error(
                    call,
                    "ToolInputValidationError",
                    truncate_error_message(&message, self.error_message_limit),
                    "E_TOOL_INVALID_ARGS",
                )
            })
    }

    /// The core of `toolCall.exec`: resolve the handler and run it.
    async fn invoke(&self, mut ctx: StepContext) -> StepContext {
        let Some(call) = ctx.tool_call.clone() else {
            return ctx;
        };
        let Some(item) = ctx.tool_catalog.iter().find(|i| i.name == call.name).cloned() else {
            ctx.tool_result = Some(ToolResult::error(
                &call,
                "ToolNotInCatalogError",
                format!("Tool '{}' is not available in the current tool catalog.", call.name),
                "E_TOOL_NOT_IN_CATALOG",
            ));
            return ctx;
        };

        let outcome = match &item.source {
            ToolSource::Remote { server, tool } => {
                Some(self.remote.call(server, tool, call.input.clone()).await)
            }
            ToolSource::Extension { extension } => {
                let handler = self.dynamic.handler(&call.name, extension);
                self.run_handler(handler, &call, &ctx).await
            }
            ToolSource::Static { .. } => {
                let handler = self.local.get(&call.name);
                self.run_handler(handler, &call, &ctx).await
            }
        };

        ctx.tool_result = Some(match outcome {
            Some(Ok(output)) => ToolResult::from_output(&call, output),
            Some(Err(e)) => {
                warn!(tool = %call.name, error = %e, "Tool handler failed");
                ToolResult::error(
                    &call,
                    e.name(),
                    truncate_error_message(&e.to_string(), self.error_message_limit),
                    e.code(),
                )
            }
            None => ToolResult::error(
                &call,
                "ToolHandlerMissingError",
                format!("No handler is registered for tool '{}'.", call.name),
                "E_TOOL_HANDLER_MISSING",
            ),
        });
        ctx
    }

    async fn run_handler(
        &self,
        handler: Option<Arc<dyn ToolHandler>>,
        call: &ToolCall,
        ctx: &StepContext,
    ) -> Option<std::result::Result<Value, ToolError>> {
        let handler = handler?;
        let tool_ctx = self.tool_context(ctx);
        Some(handler.call(call.input.clone(), &tool_ctx).await)
    }

    fn tool_context(&self, ctx: &StepContext) -> ToolContext {
        let scope = TokenScope::from_auth(
            &ctx.turn.auth,
            &ctx.instance.swarm_name,
            &ctx.instance.id,
            &ctx.agent_name,
        );
        ToolContext {
            agent_name: ctx.agent_name.clone(),
            instance: ctx.instance.clone(),
            turn: ctx.turn.clone(),
            step: ctx.step.clone().unwrap_or_else(|| Step::new(0)),
            catalog: ctx.tool_catalog.clone(),
            events: Arc::clone(&self.events),
            live_config: Arc::clone(&self.live_config),
            tokens: ScopedTokens::new(Arc::clone(&self.tokens), scope),
        }
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("local", &self.local)
            .field("dynamic", &self.dynamic)
            .field("error_message_limit", &self.error_message_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_kept() {
        assert_eq!(truncate_error_message("short", 100), "short");
        let exact = "a".repeat(50);
        assert_eq!(truncate_error_message(&exact, 50), exact);
    }

    #[test]
    fn long_messages_end_with_marker() {
        let result = truncate_error_message(&"a".repeat(200), 50);
        assert_eq!(result.chars().count(), 50);
        assert!(result.ends_with("... (truncated)"));
    }

    #[test]
    fn tiny_limits_slice_without_marker() {
        assert_eq!(truncate_error_message("abcdefghij", 5), "abcde");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let message = "é".repeat(40);
        let result = truncate_error_message(&message, 20);
        assert_eq!(result.chars().count(), 20);
        assert!(result.starts_with("éé"));
    }
}
