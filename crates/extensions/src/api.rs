//! The registration surface handed to [`ExtensionModule::register`].
//!
//! [`ExtensionModule::register`]: crate::module::ExtensionModule::register

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use swarmloop_core::{
    EventPort, LiveConfigPort, PipelineError, Resource, Result, StepContext, ToolHandler,
};
use swarmloop_pipeline::{Next, PipelineManager, PipelinePoint};
use swarmloop_tools::{DynamicToolSet, ToolDefinition};

use crate::state::ExtensionState;

static NULL: Value = Value::Null;

pub struct ExtensionApi<'a> {
    extension: &'a Resource,
    pipeline: &'a mut PipelineManager,
    tools: &'a DynamicToolSet,
    events: Arc<EventPort>,
    live_config: Arc<dyn LiveConfigPort>,
    state: ExtensionState,
}

impl<'a> ExtensionApi<'a> {
    pub fn new(
        extension: &'a Resource,
        pipeline: &'a mut PipelineManager,
        tools: &'a DynamicToolSet,
        events: Arc<EventPort>,
        live_config: Arc<dyn LiveConfigPort>,
        state: ExtensionState,
    ) -> Self {
        Self {
            extension,
            pipeline,
            tools,
            events,
            live_config,
            state,
        }
    }

    /// Name of the extension being registered.
    pub fn name(&self) -> &str {
        &self.extension.name
    }

    /// The extension's own configuration: `spec.config`, or null.
    pub fn config(&self) -> &Value {
        self.extension.spec.get("config").unwrap_or(&NULL)
    }

    pub fn mutate<F, Fut>(&mut self, point: PipelinePoint, f: F) -> std::result::Result<(), PipelineError>
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepContext>> + Send + 'static,
    {
        debug!(extension = %self.extension.name, point = %point, "Extension registered mutator");
        self.pipeline.mutate(point, f)
    }

    pub fn wrap<F, Fut>(&mut self, point: PipelinePoint, f: F) -> std::result::Result<(), PipelineError>
    where
        F: Fn(StepContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepContext>> + Send + 'static,
    {
        debug!(extension = %self.extension.name, point = %point, "Extension registered wrapper");
        self.pipeline.wrap(point, f)
    }

    /// Add a tool owned by this extension to the agent's catalog.
    pub fn register_tool(&self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        debug!(extension = %self.extension.name, tool = %definition.name, "Extension registered tool");
        self.tools.register(&self.extension.name, definition, handler);
    }

    pub fn events(&self) -> &Arc<EventPort> {
        &self.events
    }

    pub fn live_config(&self) -> &Arc<dyn LiveConfigPort> {
        &self.live_config
    }

    /// This extension's state bag; the same bag on every reconciliation.
    pub fn state(&self) -> ExtensionState {
        self.state.clone()
    }
}

impl std::fmt::Debug for ExtensionApi<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionApi")
            .field("extension", &self.extension.name)
            .finish_non_exhaustive()
    }
}
