//! Shared fixtures for the agent integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use swarmloop_agent::SwarmRuntime;
use swarmloop_config::AppConfig;
use swarmloop_core::{
    ExtensionError, InMemoryRegistry, LanguageModel, LlmError, LlmRequest, LlmResult, PatchOp,
    PatchProposal, PatchSource, Resource, ToolCall, ToolError, handler_fn,
};
use swarmloop_extensions::{ExtensionApi, ExtensionModule, StaticModuleLoader};
use swarmloop_tools::ToolRegistry;

/// A model answering from a script; once the script runs out it answers "done".
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<LlmResult, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<LlmResult, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResult, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(LlmResult::text("done")))
    }
}

/// A model that calls `echo` on every step and never stops on its own.
#[derive(Default)]
pub struct LoopingModel {
    calls: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl LoopingModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for LoopingModel {
    fn name(&self) -> &str {
        "looping"
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResult, LlmError> {
        self.requests.lock().unwrap().push(request);
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResult::tool_calls(vec![ToolCall::new(
            format!("call-{n}"),
            "echo",
            json!({"n": n}),
        )]))
    }
}

pub fn tool_call(id: &str, name: &str, input: Value) -> Result<LlmResult, LlmError> {
    Ok(LlmResult::tool_calls(vec![ToolCall::new(id, name, input)]))
}

pub fn text(content: &str) -> Result<LlmResult, LlmError> {
    Ok(LlmResult::text(content))
}

pub fn failure(reason: &str) -> Result<LlmResult, LlmError> {
    Err(LlmError::RequestFailed(reason.into()))
}

/// An extension whose registration is a plain closure.
pub struct FnModule<F>(F);

#[async_trait]
impl<F> ExtensionModule for FnModule<F>
where
    F: Fn(&mut ExtensionApi<'_>) -> Result<(), ExtensionError> + Send + Sync,
{
    async fn register(&self, api: &mut ExtensionApi<'_>) -> Result<(), ExtensionError> {
        (self.0)(api)
    }
}

pub fn module<F>(f: F) -> Arc<dyn ExtensionModule>
where
    F: Fn(&mut ExtensionApi<'_>) -> Result<(), ExtensionError> + Send + Sync + 'static,
{
    Arc::new(FnModule(f))
}

/// Local handlers for the exports of the `utils` tool resource.
pub fn local_tools() -> ToolRegistry {
    ToolRegistry::new()
        .with("echo", handler_fn(|input, _ctx| async move { Ok(json!({"echo": input})) }))
        .with(
            "fail",
            handler_fn(|_input, _ctx| async {
                Err(ToolError::ExecutionFailed {
                    tool_name: "fail".into(),
                    reason: "disk full".into(),
                })
            }),
        )
        .with(
            "connect",
            handler_fn(|_input, _ctx| async {
                Ok(json!({
                    "status": "authorization_required",
                    "authorizationUrl": "https://auth.example/start",
                    "message": "Sign in to continue"
                }))
            }),
        )
        .with(
            "tune",
            handler_fn(|input, ctx| async move {
                let temperature = input.get("temperature").cloned().unwrap_or(json!(0.9));
                let proposal = PatchProposal::json6902(vec![PatchOp::replace(
                    "/modelConfig/params/temperature",
                    temperature,
                )])
                .source(PatchSource::new("tool", "tune"))
                .reason("adjust sampling");
                match ctx.live_config.propose_patch(proposal).await {
                    Ok(patch) => Ok(json!({"patch": patch.name})),
                    Err(e) => Err(ToolError::ExecutionFailed {
                        tool_name: "tune".into(),
                        reason: e.to_string(),
                    }),
                }
            }),
        )
}

pub fn utils_tool() -> Resource {
    Resource::new(
        "Tool",
        "utils",
        json!({
            "exports": [
                {"name": "echo", "description": "Echo the input"},
                {"name": "fail", "description": "Always fails"},
                {"name": "connect", "description": "Needs authorization"},
                {"name": "tune", "description": "Propose a sampling change"}
            ]
        }),
    )
}

/// An agent document using the `utils` tools and the given extensions.
pub fn agent_doc(extensions: &[&str]) -> Value {
    json!({
        "prompts": {"system": "You are a careful assistant."},
        "modelConfig": {"modelRef": "scripted", "params": {"temperature": 0}},
        "tools": ["utils"],
        "extensions": extensions,
    })
}

pub struct Harness {
    pub runtime: SwarmRuntime,
    pub registry: Arc<InMemoryRegistry>,
    // Keeps the state directory alive for the runtime.
    pub dir: TempDir,
}

pub struct HarnessBuilder {
    swarm: Value,
    registry: InMemoryRegistry,
    loader: StaticModuleLoader,
    max_steps: Option<u32>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            swarm: json!({}),
            registry: InMemoryRegistry::new().with(utils_tool()),
            loader: StaticModuleLoader::new(),
            max_steps: None,
        }
    }

    pub fn swarm(mut self, swarm: Value) -> Self {
        self.swarm = swarm;
        self
    }

    pub fn max_steps(mut self, n: u32) -> Self {
        self.max_steps = Some(n);
        self
    }

    /// Declare an `Extension` resource named `name` backed by `module`.
    pub fn extension(mut self, name: &str, module: Arc<dyn ExtensionModule>) -> Self {
        self.registry.insert(Resource::new("Extension", name, json!({})));
        self.loader.insert(name, module);
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.runtime.state_dir = dir.path().to_string_lossy().into_owned();
        if let Some(n) = self.max_steps {
            config.runtime.max_steps_per_turn = n;
        }
        let registry = Arc::new(self.registry);
        let runtime = SwarmRuntime::builder("demo", self.swarm, registry.clone())
            .config(config)
            .instance_id("inst-1")
            .tools(local_tools())
            .module_loader(Arc::new(self.loader))
            .build();
        Harness {
            runtime,
            registry,
            dir,
        }
    }
}
