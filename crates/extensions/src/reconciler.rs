//! ExtensionReconciler: keeps an agent's loaded extensions and attached
//! remote tool servers in line with its effective configuration.
//!
//! Called once per step after the live-config safe point. The desired
//! extension set is read from `/extensions` and the desired server set from
//! `/mcpServers` of the effective agent document. Each set is compared by
//! identity (kind, name and spec) with what the previous step used; an
//! unchanged set costs nothing.
//!
//! When the extension set changed, every extension is registered into a
//! brand-new [`PipelineManager`] and a staged tool set. Both replace the
//! previous ones only once every extension registered: the pipeline as a
//! single `Arc` swap, the tools in one [`DynamicToolSet::commit`]. A failing
//! load or registration discards the staged work, leaves the previous
//! pipeline and tools in place and returns the error. The identity list is
//! not updated, so the next step tries again.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use swarmloop_core::{
    ConfigRegistry, EventPort, ExtensionError, LiveConfigPort, ObjectRef, Resource,
};
use swarmloop_pipeline::PipelineManager;
use swarmloop_tools::{DynamicToolSet, RemoteToolManager};

use crate::api::ExtensionApi;
use crate::module::ModuleLoader;
use crate::state::ExtensionStateArena;

pub const EXTENSION_KIND: &str = "Extension";
pub const REMOTE_SERVER_KIND: &str = "McpServer";

/// Identity of a declared resource: kind, name and the serialized spec.
pub fn resource_identity(resource: &Resource) -> String {
    format!("{}/{}:{}", resource.kind, resource.name, resource.spec)
}

pub struct ExtensionReconciler {
    registry: Arc<dyn ConfigRegistry>,
    loader: Arc<dyn ModuleLoader>,
    tools: Arc<DynamicToolSet>,
    remote: Arc<RemoteToolManager>,
    events: Arc<EventPort>,
    live_config: Arc<dyn LiveConfigPort>,
    arena: ExtensionStateArena,
    pipeline: Arc<PipelineManager>,
    loaded: Option<Vec<(String, String)>>,
    attached: Option<Vec<String>>,
}

impl ExtensionReconciler {
    pub fn new(
        registry: Arc<dyn ConfigRegistry>,
        loader: Arc<dyn ModuleLoader>,
        tools: Arc<DynamicToolSet>,
        remote: Arc<RemoteToolManager>,
        events: Arc<EventPort>,
        live_config: Arc<dyn LiveConfigPort>,
    ) -> Self {
        Self {
            registry,
            loader,
            tools,
            remote,
            events,
            live_config,
            arena: ExtensionStateArena::new(),
            pipeline: Arc::new(PipelineManager::new()),
            loaded: None,
            attached: None,
        }
    }

    /// The pipeline built by the last successful reconciliation.
    pub fn pipeline(&self) -> Arc<PipelineManager> {
        Arc::clone(&self.pipeline)
    }

    pub fn state_arena(&self) -> &ExtensionStateArena {
        &self.arena
    }

    /// Names of the extensions registered into the current pipeline.
    pub fn loaded_extensions(&self) -> Vec<String> {
        self.loaded
            .as_ref()
            .map(|list| list.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Sync extensions and remote tool servers with `agent`, returning the
    /// pipeline the rest of the step must use.
    pub async fn reconcile(&mut self, agent: &Value) -> Result<Arc<PipelineManager>, ExtensionError> {
        self.reconcile_extensions(agent).await?;
        self.reconcile_remote(agent).await?;
        Ok(self.pipeline())
    }

    async fn reconcile_extensions(&mut self, agent: &Value) -> Result<(), ExtensionError> {
        let desired = self.resolve_all(agent.pointer("/extensions"), EXTENSION_KIND)?;
        let identities: Vec<(String, String)> = desired
            .iter()
            .map(|ext| (ext.name.clone(), resource_identity(ext)))
            .collect();
        if self.loaded.as_ref() == Some(&identities) {
            return Ok(());
        }

        let mut pipeline = PipelineManager::new();
        let staged = DynamicToolSet::new();
        for ext in &desired {
            let module = self.loader.load(ext).await.inspect_err(|e| {
                warn!(extension = %ext.name, error = %e, "Extension failed to load");
            })?;
            let mut api = ExtensionApi::new(
                ext,
                &mut pipeline,
                &staged,
                Arc::clone(&self.events),
                Arc::clone(&self.live_config),
                self.arena.handle(&ext.name),
            );
            module.register(&mut api).await.map_err(|e| {
                warn!(extension = %ext.name, error = %e, "Extension failed to register");
                match e {
                    ExtensionError::Pipeline(inner) => ExtensionError::RegisterFailed {
                        name: ext.name.clone(),
                        reason: inner.to_string(),
                    },
                    other => other,
                }
            })?;
        }

        info!(
            extensions = desired.len(),
            names = ?identities.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            "Extensions reconciled"
        );
        // Extensions that stay re-registered their tools into `staged`.
        let retired: Vec<&str> = self
            .loaded
            .iter()
            .flatten()
            .chain(identities.iter())
            .map(|(name, _)| name.as_str())
            .collect();
        self.tools.commit(&retired, staged);
        self.pipeline = Arc::new(pipeline);
        self.loaded = Some(identities);
        Ok(())
    }

    async fn reconcile_remote(&mut self, agent: &Value) -> Result<(), ExtensionError> {
        let desired = self.resolve_all(agent.pointer("/mcpServers"), REMOTE_SERVER_KIND)?;
        let identities: Vec<String> = desired.iter().map(resource_identity).collect();
        if self.attached.as_ref() == Some(&identities) {
            return Ok(());
        }

        self.remote.sync(&desired).await.map_err(|e| {
            let name = match &e {
                swarmloop_core::ToolError::RemoteUnavailable { server, .. } => server.clone(),
                _ => "unknown".to_string(),
            };
            ExtensionError::RemoteSyncFailed {
                name,
                reason: e.to_string(),
            }
        })?;
        info!(servers = desired.len(), "Remote tool servers reconciled");
        self.attached = Some(identities);
        Ok(())
    }

    /// Resolve a reference list. Plain references must resolve; selectors
    /// may match nothing.
    fn resolve_all(&self, entries: Option<&Value>, kind: &str) -> Result<Vec<Resource>, ExtensionError> {
        let Some(entries) = entries.and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Resource> = Vec::new();
        for entry in entries {
            let found = if entry.get("selector").is_some() {
                self.registry.expand(std::slice::from_ref(entry), kind)
            } else {
                let reference = ObjectRef::from_value(entry, kind).ok_or_else(|| {
                    ExtensionError::Unresolved {
                        name: entry.to_string(),
                        reason: "not a resource reference".into(),
                    }
                })?;
                let resource = self.registry.resolve(&reference).ok_or_else(|| {
                    ExtensionError::Unresolved {
                        name: reference.name.clone(),
                        reason: format!("{reference} not found"),
                    }
                })?;
                vec![resource]
            };
            for resource in found {
                if !out.iter().any(|r| r.kind == resource.kind && r.name == resource.name) {
                    out.push(resource);
                }
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for ExtensionReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionReconciler")
            .field("loaded", &self.loaded_extensions())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
