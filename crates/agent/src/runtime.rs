//! SwarmRuntime: the services shared by every agent of one swarm instance.
//!
//! The runtime constructs one [`EventPort`], one [`LiveConfigManager`] and
//! one [`TraceRecorder`] and hands them down to each agent it starts. It also
//! listens for `auth.granted` and re-queues the named agent so the turn that
//! waited for authorization can resume.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use swarmloop_config::AppConfig;
use swarmloop_core::event::AUTH_GRANTED;
use swarmloop_core::oauth::UnconfiguredOAuth;
use swarmloop_core::{
    ConfigRegistry, Error, EventPort, HandlerId, InboundEvent, InstanceInfo, LanguageModel, Result,
    RuntimeEvent, TokenAccessor,
};
use swarmloop_extensions::{ExtensionReconciler, ModuleLoader, StaticModuleLoader};
use swarmloop_live_config::{LiveConfigManager, LiveConfigOptions};
use swarmloop_pipeline::PipelinePoint;
use swarmloop_telemetry::TraceRecorder;
use swarmloop_tools::{
    DynamicToolSet, NoRemoteConnector, RemoteConnector, RemoteToolManager, ToolExecutor,
    ToolRegistry,
};

use crate::instance::{AgentHandle, AgentInstance};
use crate::runner::{RunnerParts, TurnRunner};

type AgentMap = Arc<RwLock<HashMap<String, AgentHandle>>>;

/// The resume event queued for an agent when `auth.granted` names it.
pub fn auth_resume_event(payload: &Value) -> InboundEvent {
    let mut event = InboundEvent::text("");
    event.metadata.insert("type".into(), json!(AUTH_GRANTED));
    event.metadata.insert("resume".into(), payload.clone());
    event
}

fn granted_agent(payload: &Value) -> Option<&str> {
    payload
        .get("agentName")
        .or_else(|| payload.get("agent"))
        .and_then(Value::as_str)
}

pub struct SwarmRuntimeBuilder {
    swarm_name: String,
    swarm_config: Value,
    registry: Arc<dyn ConfigRegistry>,
    config: AppConfig,
    instance_id: Option<String>,
    tools: ToolRegistry,
    loader: Arc<dyn ModuleLoader>,
    connector: Arc<dyn RemoteConnector>,
    tokens: Arc<dyn TokenAccessor>,
    events: Option<Arc<EventPort>>,
    traces: Option<Arc<TraceRecorder>>,
}

impl SwarmRuntimeBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Reuse an instance id so a restarted runtime continues its live-config state.
    pub fn instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// Handlers for the exports of statically declared tools.
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn remote_connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn token_accessor(mut self, tokens: Arc<dyn TokenAccessor>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn events(mut self, events: Arc<EventPort>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn traces(mut self, traces: Arc<TraceRecorder>) -> Self {
        self.traces = Some(traces);
        self
    }

    pub fn build(self) -> SwarmRuntime {
        let instance_id = self
            .instance_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let instance = InstanceInfo {
            key: format!("{}/{}", self.swarm_name, instance_id),
            id: instance_id,
            swarm_name: self.swarm_name,
        };
        let events = self.events.unwrap_or_default();
        let live_config = Arc::new(
            LiveConfigManager::new(LiveConfigOptions {
                instance_id: instance.id.clone(),
                swarm_name: instance.swarm_name.clone(),
                swarm_config: self.swarm_config.clone(),
                state_dir: self.config.runtime.state_path(),
                write_snapshots: self.config.live_config.write_snapshots,
            })
            .with_events(Arc::clone(&events)),
        );

        let agents: AgentMap = Arc::new(RwLock::new(HashMap::new()));
        let listener = Arc::clone(&agents);
        let auth_handler = events.on(AUTH_GRANTED, move |event: &RuntimeEvent| {
            resume_after_auth(&listener, event);
        });

        info!(swarm = %instance.swarm_name, instance = %instance.id, "Swarm runtime created");
        SwarmRuntime {
            instance,
            swarm_config: self.swarm_config,
            config: self.config,
            registry: self.registry,
            tools: Arc::new(self.tools),
            loader: self.loader,
            connector: self.connector,
            tokens: self.tokens,
            events,
            live_config,
            traces: self.traces.unwrap_or_default(),
            agents,
            auth_handler,
        }
    }
}

fn resume_after_auth(agents: &AgentMap, event: &RuntimeEvent) {
    let Some(agent) = granted_agent(&event.payload) else {
        warn!("auth.granted without an agent name, ignoring");
        return;
    };
    let handle = agents
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(agent)
        .cloned();
    match handle {
        Some(handle) => {
            info!(agent, "Authorization granted, resuming agent");
            if let Err(e) = handle.enqueue(auth_resume_event(&event.payload)) {
                warn!(agent, error = %e, "Could not queue resume turn");
            }
        }
        None => warn!(agent, "auth.granted for unknown agent"),
    }
}

pub struct SwarmRuntime {
    instance: InstanceInfo,
    swarm_config: Value,
    config: AppConfig,
    registry: Arc<dyn ConfigRegistry>,
    tools: Arc<ToolRegistry>,
    loader: Arc<dyn ModuleLoader>,
    connector: Arc<dyn RemoteConnector>,
    tokens: Arc<dyn TokenAccessor>,
    events: Arc<EventPort>,
    live_config: Arc<LiveConfigManager>,
    traces: Arc<TraceRecorder>,
    agents: AgentMap,
    auth_handler: HandlerId,
}

impl SwarmRuntime {
    pub fn builder(
        swarm_name: impl Into<String>,
        swarm_config: Value,
        registry: Arc<dyn ConfigRegistry>,
    ) -> SwarmRuntimeBuilder {
        SwarmRuntimeBuilder {
            swarm_name: swarm_name.into(),
            swarm_config,
            registry,
            config: AppConfig::default(),
            instance_id: None,
            tools: ToolRegistry::new(),
            loader: Arc::new(StaticModuleLoader::new()),
            connector: Arc::new(NoRemoteConnector),
            tokens: Arc::new(UnconfiguredOAuth),
            events: None,
            traces: None,
        }
    }

    pub fn instance(&self) -> &InstanceInfo {
        &self.instance
    }

    pub fn events(&self) -> &Arc<EventPort> {
        &self.events
    }

    pub fn live_config(&self) -> &Arc<LiveConfigManager> {
        &self.live_config
    }

    pub fn traces(&self) -> &Arc<TraceRecorder> {
        &self.traces
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Start an agent instance for `agent_config` and return its handle.
    pub async fn add_agent(
        &self,
        name: impl Into<String>,
        agent_config: Value,
        model: Arc<dyn LanguageModel>,
    ) -> Result<AgentHandle> {
        let name = name.into();
        if self.agent(&name).is_some() {
            return Err(Error::Config {
                message: format!("agent {name} is already running"),
            });
        }

        let dynamic = Arc::new(DynamicToolSet::new());
        let remote = Arc::new(RemoteToolManager::new(Arc::clone(&self.connector)));
        let port = self.live_config.port(&name);
        let executor = ToolExecutor::new(
            Arc::clone(&self.tools),
            Arc::clone(&dynamic),
            Arc::clone(&remote),
            Arc::clone(&self.events),
            Arc::clone(&port),
        )
        .with_tokens(Arc::clone(&self.tokens))
        .with_error_message_limit(self.config.runtime.error_message_limit);
        let reconciler = ExtensionReconciler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.loader),
            dynamic,
            remote,
            Arc::clone(&self.events),
            port,
        );

        let runner = TurnRunner::new(RunnerParts {
            agent_name: name.clone(),
            agent_config,
            instance: self.instance.clone(),
            swarm_config: self.swarm_config.clone(),
            model,
            live_config: Arc::clone(&self.live_config),
            reconciler,
            executor,
            registry: Arc::clone(&self.registry),
            traces: Arc::clone(&self.traces),
            max_steps_per_turn: self.config.runtime.max_steps_per_turn,
        });
        let handle = AgentInstance::start(runner).await?;

        self.agents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, handle.clone());
        Ok(handle)
    }

    pub fn agent(&self, name: &str) -> Option<AgentHandle> {
        self.agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Fire a workspace lifecycle point for one agent.
    pub async fn notify_workspace(
        &self,
        agent: &str,
        point: PipelinePoint,
        payload: Value,
    ) -> Result<Option<Value>> {
        let handle = self.agent(agent).ok_or_else(|| Error::Config {
            message: format!("unknown agent {agent}"),
        })?;
        handle.notify_workspace(point, payload).await
    }
}

impl Drop for SwarmRuntime {
    fn drop(&mut self) {
        self.events.off(AUTH_GRANTED, self.auth_handler);
    }
}

impl std::fmt::Debug for SwarmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmRuntime")
            .field("instance", &self.instance)
            .field("agents", &self.agent_names())
            .finish_non_exhaustive()
    }
}
