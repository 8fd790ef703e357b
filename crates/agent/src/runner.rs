//! The turn/step loop of one agent.
//!
//! A [`TurnRunner`] owns everything that is private to an agent: its
//! extension reconciler (and through it the current [`PipelineManager`]),
//! its tool executor and its dynamic and remote tool sets. It is driven by a
//! single pump task, so nothing in here needs locking.
//!
//! One turn runs
//!
//! ```text
//! turn.pre
//! ( step.pre → safe point → reconcile → step.config → step.tools
//!   → step.blocks → step.llmCall [→ step.llmError → retry]
//!   → toolCall.* per call → step.post )*
//! turn.post
//! ```
//!
//! After every point the returned context goes through [`accept_changes`],
//! so interceptors can only write the fields their point owns.

use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use swarmloop_config::swarm_max_steps;
use swarmloop_core::{
    ConfigRegistry, Error, ErrorInfo, InboundEvent, InstanceInfo, LanguageModel, LlmErrorInfo,
    PipelineError, Result, Step, StepContext, ToolCall, ToolStatus, Turn, TurnMessage, TurnStatus,
};
use swarmloop_extensions::ExtensionReconciler;
use swarmloop_live_config::LiveConfigManager;
use swarmloop_pipeline::{PipelineManager, PipelinePoint, accept_changes};
use swarmloop_telemetry::{Span, SpanKind, TraceRecorder};
use swarmloop_tools::{ToolExecutor, build_tool_catalog};

use crate::blocks::{default_blocks, model_request};

/// `turn.metadata.interruptReason` of turns dequeued while paused.
pub const INTERRUPT_PAUSED: &str = "instance_paused";

/// Steps per turn when the swarm document does not set a limit.
pub const DEFAULT_MAX_STEPS_PER_TURN: u32 = 32;

/// Everything a runner is assembled from.
pub struct RunnerParts {
    pub agent_name: String,
    /// Base agent document.
    pub agent_config: Value,
    pub instance: InstanceInfo,
    /// Base swarm document.
    pub swarm_config: Value,
    pub model: Arc<dyn LanguageModel>,
    pub live_config: Arc<LiveConfigManager>,
    pub reconciler: ExtensionReconciler,
    pub executor: ToolExecutor,
    pub registry: Arc<dyn ConfigRegistry>,
    pub traces: Arc<TraceRecorder>,
    pub max_steps_per_turn: u32,
}

pub struct TurnRunner {
    agent_name: String,
    agent_config: Value,
    instance: InstanceInfo,
    swarm_config: Value,
    model: Arc<dyn LanguageModel>,
    live_config: Arc<LiveConfigManager>,
    reconciler: ExtensionReconciler,
    executor: ToolExecutor,
    registry: Arc<dyn ConfigRegistry>,
    traces: Arc<TraceRecorder>,
    max_steps_per_turn: u32,
}

/// Spans of the turn being run.
struct TurnTrace {
    recorder: Arc<TraceRecorder>,
    trace_id: String,
}

impl TurnTrace {
    fn record(&self, span: Span) {
        self.recorder.record_span(&self.trace_id, span);
    }
}

/// Run the mutators of `point` and keep the changes the point may make.
async fn run_point(pipeline: &PipelineManager, point: PipelinePoint, ctx: &mut StepContext) -> Result<()> {
    if pipeline.count(point) == 0 {
        return Ok(());
    }
    let out = pipeline.run_mutators(point, ctx.clone()).await?;
    let merged = accept_changes(point, ctx, out);
    *ctx = merged;
    Ok(())
}

/// Keep the step that was running when the turn failed.
fn keep_partial_step(ctx: &mut StepContext) {
    if let Some(mut step) = ctx.step.take() {
        if !ctx.turn.steps.iter().any(|s| s.id == step.id) {
            step.ended_at = Some(Utc::now());
            ctx.turn.steps.push(step);
        }
    }
}

impl TurnRunner {
    pub fn new(parts: RunnerParts) -> Self {
        Self {
            agent_name: parts.agent_name,
            agent_config: parts.agent_config,
            instance: parts.instance,
            swarm_config: parts.swarm_config,
            model: parts.model,
            live_config: parts.live_config,
            reconciler: parts.reconciler,
            executor: parts.executor,
            registry: parts.registry,
            traces: parts.traces,
            max_steps_per_turn: parts.max_steps_per_turn.max(1),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// The pipeline the next turn starts with.
    pub fn pipeline(&self) -> Arc<PipelineManager> {
        self.reconciler.pipeline()
    }

    pub fn reconciler(&self) -> &ExtensionReconciler {
        &self.reconciler
    }

    /// Register the agent with live config and load its declared extensions,
    /// so `turn.pre` of the first turn already sees them.
    pub async fn prepare(&mut self) -> Result<()> {
        self.live_config
            .init_agent(&self.agent_name, self.agent_config.clone())
            .await?;
        let agent = self
            .live_config
            .effective_config(&self.agent_name)
            .await
            .map(|effective| effective.agent)
            .unwrap_or_else(|| self.agent_config.clone());
        if let Err(e) = self.reconciler.reconcile(&agent).await {
            // The first step reconciles again and fails its turn.
            warn!(agent = %self.agent_name, error = %e, "Initial extension reconciliation failed");
        }
        Ok(())
    }

    fn context(&self, turn: Turn) -> StepContext {
        StepContext::new(
            self.instance.clone(),
            self.agent_name.clone(),
            self.swarm_config.clone(),
            self.agent_config.clone(),
            turn,
        )
    }

    fn step_limit(&self, ctx: &StepContext) -> u32 {
        swarm_max_steps(ctx.swarm_document()).unwrap_or(self.max_steps_per_turn)
    }

    /// Run one turn for `event`. `active` is false while the instance is
    /// paused; the turn is then interrupted before any step.
    ///
    /// Never fails: errors end the turn as `failed` with `metadata.error`.
    pub async fn run(&mut self, event: InboundEvent, active: bool) -> Turn {
        let mut turn = Turn::new(event);
        turn.status = TurnStatus::Running;
        if !turn.input.is_empty() {
            turn.messages.push(TurnMessage::user(turn.input.clone()));
        }

        let trace = TurnTrace {
            recorder: Arc::clone(&self.traces),
            trace_id: self.traces.start_trace(&turn.id, &self.agent_name),
        };
        let mut root = Span::new(SpanKind::Turn, format!("turn {}", self.agent_name))
            .with_meta("turnId", turn.id.clone());
        info!(agent = %self.agent_name, turn_id = %turn.id, active, "Turn started");

        let mut ctx = self.context(turn);
        let mut pipeline = self.reconciler.pipeline();

        let status = if !active {
            info!(agent = %self.agent_name, turn_id = %ctx.turn.id, "Instance paused, interrupting turn");
            ctx.turn.metadata.interrupt_reason = Some(INTERRUPT_PAUSED.to_string());
            TurnStatus::Interrupted
        } else {
            match self.drive(&mut ctx, &mut pipeline, &trace, &root.id).await {
                Ok(()) => TurnStatus::Completed,
                Err(e) => {
                    error!(agent = %self.agent_name, turn_id = %ctx.turn.id, error = %e, "Turn failed");
                    keep_partial_step(&mut ctx);
                    ctx.turn.metadata.error = Some(ErrorInfo {
                        name: e.kind_name().to_string(),
                        message: e.to_string(),
                    });
                    TurnStatus::Failed
                }
            }
        };
        ctx.turn.finish(status);

        ctx.step = None;
        if let Err(e) = run_point(&pipeline, PipelinePoint::TurnPost, &mut ctx).await {
            warn!(agent = %self.agent_name, turn_id = %ctx.turn.id, error = %e, "turn.post interceptor failed");
            if ctx.turn.metadata.error.is_none() {
                ctx.turn.metadata.error = Some(ErrorInfo {
                    name: e.kind_name().to_string(),
                    message: e.to_string(),
                });
                ctx.turn.status = TurnStatus::Failed;
            }
        }

        root.metadata.insert("status".into(), json!(ctx.turn.status.to_string()));
        root.metadata.insert("steps".into(), json!(ctx.turn.steps.len()));
        root.end(ctx.turn.status != TurnStatus::Failed);
        trace.record(root);
        self.traces.end_trace(&trace.trace_id);

        info!(
            agent = %self.agent_name,
            turn_id = %ctx.turn.id,
            status = %ctx.turn.status,
            steps = ctx.turn.steps.len(),
            step_limit_reached = ctx.turn.metadata.step_limit_reached,
            "Turn finished"
        );
        ctx.turn
    }

    async fn drive(
        &mut self,
        ctx: &mut StepContext,
        pipeline: &mut Arc<PipelineManager>,
        trace: &TurnTrace,
        root_id: &str,
    ) -> Result<()> {
        run_point(pipeline, PipelinePoint::TurnPre, ctx).await?;

        let mut index: u32 = 0;
        loop {
            let limit = self.step_limit(ctx);
            if index >= limit {
                warn!(agent = %self.agent_name, turn_id = %ctx.turn.id, limit, "Step limit reached");
                ctx.turn.metadata.step_limit_reached = true;
                return Ok(());
            }

            let mut span = Span::new(SpanKind::Step, format!("step {index}"))
                .with_parent(root_id)
                .with_meta("index", index);
            let outcome = self.run_step(index, ctx, pipeline, trace, &span.id).await;
            span.end(outcome.is_ok());
            trace.record(span);

            if outcome? {
                return Ok(());
            }
            index += 1;
        }
    }

    /// One step. Returns true when the model stopped calling tools.
    async fn run_step(
        &mut self,
        index: u32,
        ctx: &mut StepContext,
        pipeline: &mut Arc<PipelineManager>,
        trace: &TurnTrace,
        span_id: &str,
    ) -> Result<bool> {
        let step = Step::new(index);
        let step_id = step.id.clone();
        ctx.begin_step(step);
        debug!(agent = %self.agent_name, turn_id = %ctx.turn.id, step = index, "Step started");

        // step.pre still belongs to the pipeline of the previous step.
        run_point(pipeline, PipelinePoint::StepPre, ctx).await?;

        self.apply_safe_point(ctx, &step_id, trace, span_id).await?;
        *pipeline = self.reconciler.reconcile(ctx.agent_document()).await?;
        run_point(pipeline, PipelinePoint::StepConfig, ctx).await?;

        let catalog = build_tool_catalog(
            ctx.agent_document(),
            self.registry.as_ref(),
            self.executor.dynamic(),
            self.executor.remote(),
        )
        .await;
        ctx.tool_catalog = catalog;
        run_point(pipeline, PipelinePoint::StepTools, ctx).await?;

        let blocks = default_blocks(ctx);
        ctx.blocks = blocks;
        run_point(pipeline, PipelinePoint::StepBlocks, ctx).await?;

        self.call_model(pipeline, ctx, trace, span_id).await?;
        let result = ctx.llm_result.clone().unwrap_or_default();
        if let Some(step) = ctx.step.as_mut() {
            step.llm_result = Some(result.clone());
        }
        let content = result.content.clone().unwrap_or_default();
        ctx.turn
            .messages
            .push(TurnMessage::assistant(content.clone(), result.tool_calls.clone()));

        let finished = result.tool_calls.is_empty();
        if finished {
            ctx.turn.summary = Some(content);
        } else {
            debug!(agent = %self.agent_name, step = index, calls = result.tool_calls.len(), "Executing tool calls");
            for call in result.tool_calls {
                self.run_tool_call(pipeline, call, ctx, trace, span_id).await?;
            }
        }

        run_point(pipeline, PipelinePoint::StepPost, ctx).await?;
        if let Some(mut step) = ctx.step.take() {
            step.ended_at = Some(Utc::now());
            ctx.turn.steps.push(step.clone());
            ctx.step = Some(step);
        }
        Ok(finished)
    }

    async fn apply_safe_point(
        &self,
        ctx: &mut StepContext,
        step_id: &str,
        trace: &TurnTrace,
        parent: &str,
    ) -> Result<()> {
        let mut span = Span::new(SpanKind::ConfigApply, "step.config").with_parent(parent);
        match self.live_config.apply_at_safe_point(&self.agent_name, step_id).await {
            Ok(effective) => {
                span.metadata.insert("revision".into(), json!(effective.revision));
                span.end(true);
                trace.record(span);
                ctx.effective_config = Some(effective);
                Ok(())
            }
            Err(e) => {
                span.end(false);
                trace.record(span);
                Err(e.into())
            }
        }
    }

    async fn call_model(
        &self,
        pipeline: &PipelineManager,
        ctx: &mut StepContext,
        trace: &TurnTrace,
        parent: &str,
    ) -> Result<()> {
        let mut span = Span::new(SpanKind::LlmCall, self.model.name().to_string()).with_parent(parent);
        let mut retries = 0;
        let outcome = self.call_model_with_retry(pipeline, ctx, &mut retries).await;
        span.metadata.insert("retries".into(), json!(retries));
        span.end(outcome.is_ok());
        trace.record(span);
        outcome
    }

    /// `step.llmCall`, and on failure `step.llmError` once. Without a result
    /// supplied by `step.llmError` the call is retried once; a second failure
    /// is returned.
    async fn call_model_with_retry(
        &self,
        pipeline: &PipelineManager,
        ctx: &mut StepContext,
        retries: &mut u32,
    ) -> Result<()> {
        loop {
            let err = match self.invoke_model(pipeline, ctx).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if *retries > 0 {
                return Err(err);
            }

            warn!(agent = %self.agent_name, turn_id = %ctx.turn.id, error = %err, "Model call failed");
            ctx.llm_error = Some(LlmErrorInfo {
                message: err.to_string(),
                retry_count: *retries,
            });
            run_point(pipeline, PipelinePoint::StepLlmError, ctx).await?;
            if ctx.llm_result.is_some() {
                info!(agent = %self.agent_name, turn_id = %ctx.turn.id, "step.llmError supplied a result");
                return Ok(());
            }
            *retries += 1;
        }
    }

    async fn invoke_model(&self, pipeline: &PipelineManager, ctx: &mut StepContext) -> Result<()> {
        let model = Arc::clone(&self.model);
        let out = pipeline
            .run_wrapped(PipelinePoint::StepLlmCall, ctx.clone(), move |mut ctx: StepContext| {
                let model = Arc::clone(&model);
                async move {
                    let request = model_request(&ctx);
                    match model.complete(request).await {
                        Ok(result) => {
                            ctx.llm_result = Some(result);
                            Ok(ctx)
                        }
                        Err(e) => Err(Error::from(e)),
                    }
                }
            })
            .await?;
        let merged = accept_changes(PipelinePoint::StepLlmCall, ctx, out);
        *ctx = merged;
        Ok(())
    }

    async fn run_tool_call(
        &self,
        pipeline: &PipelineManager,
        call: ToolCall,
        ctx: &mut StepContext,
        trace: &TurnTrace,
        parent: &str,
    ) -> Result<()> {
        let mut span = Span::new(SpanKind::ToolCall, call.name.clone())
            .with_parent(parent)
            .with_meta("toolCallId", call.id.clone());

        let out = match self.executor.execute_tool_call(pipeline, call.clone(), ctx.clone()).await {
            Ok(out) => out,
            Err(e) => {
                span.end(false);
                trace.record(span);
                return Err(e);
            }
        };
        *ctx = out;

        let Some(result) = ctx.tool_result.clone() else {
            span.end(false);
            trace.record(span);
            return Err(Error::Internal(format!("tool call {} produced no result", call.id)));
        };
        let status = result.status();
        span.metadata.insert("status".into(), json!(status.as_str()));
        span.end(status != ToolStatus::Error);
        trace.record(span);

        if let Some(step) = ctx.step.as_mut() {
            step.tool_calls.push(call);
            step.tool_results.push(result.clone());
        }
        ctx.turn.messages.push(TurnMessage::tool(&result));
        ctx.turn.tool_results.push(result);
        Ok(())
    }

    /// Fire a workspace lifecycle point outside the turn loop and return the
    /// payload as the interceptors left it.
    pub async fn notify_workspace(&self, point: PipelinePoint, payload: Value) -> Result<Option<Value>> {
        if !point.is_workspace_point() {
            return Err(PipelineError::UnknownPoint(format!("{point} is not a workspace point")).into());
        }
        let mut ctx = self.context(Turn::new(InboundEvent::default()));
        ctx.effective_config = self.live_config.effective_config(&self.agent_name).await;
        ctx.workspace = Some(payload);
        run_point(&self.reconciler.pipeline(), point, &mut ctx).await?;
        Ok(ctx.workspace)
    }
}

impl std::fmt::Debug for TurnRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnRunner")
            .field("agent", &self.agent_name)
            .field("model", &self.model.name())
            .field("max_steps_per_turn", &self.max_steps_per_turn)
            .finish_non_exhaustive()
    }
}
