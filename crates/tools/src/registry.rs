//! Handler registries.
//!
//! [`ToolRegistry`] maps export names of statically declared tools to their
//! handlers. It is filled by the host before any turn runs and shared by
//! every agent of a swarm.
//!
//! [`DynamicToolSet`] holds the tools registered at runtime by extensions of
//! one agent, tagged with the owning extension so a reconciliation can drop
//! everything an unloaded extension contributed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use swarmloop_core::tool::open_parameters_schema;
use swarmloop_core::{ToolCatalogItem, ToolHandler, ToolSource};

/// Name, description and parameter schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "open_parameters_schema")]
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: open_parameters_schema(),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Handlers for the exports of statically declared tools.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an export name. Replaces any existing handler.
    pub fn register(&self, export: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        let export = export.into();
        debug!(export = %export, "Registering local tool handler");
        if let Ok(mut map) = self.handlers.write() {
            map.insert(export, handler);
        }
    }

    pub fn with(self, export: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(export, handler);
        self
    }

    pub fn get(&self, export: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.read().ok()?.get(export).cloned()
    }

    /// List all registered export names.
    pub fn names(&self) -> Vec<String> {
        self.handlers
            .read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("exports", &self.names())
            .finish()
    }
}

struct DynamicTool {
    owner: String,
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Tools registered by the extensions of one agent, in registration order.
#[derive(Default)]
pub struct DynamicToolSet {
    tools: RwLock<Vec<DynamicTool>>,
}

impl DynamicToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool for `owner`. A tool of the same name from the same
    /// owner is replaced in place.
    pub fn register(&self, owner: &str, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        let Ok(mut tools) = self.tools.write() else {
            return;
        };
        let tool = DynamicTool {
            owner: owner.to_string(),
            definition,
            handler,
        };
        match tools
            .iter_mut()
            .find(|t| t.owner == tool.owner && t.definition.name == tool.definition.name)
        {
            Some(slot) => *slot = tool,
            None => tools.push(tool),
        }
    }

    /// Drop every tool registered by `owner`. Returns how many were removed.
    pub fn remove_by_owner(&self, owner: &str) -> usize {
        let Ok(mut tools) = self.tools.write() else {
            return 0;
        };
        let before = tools.len();
        tools.retain(|t| t.owner != owner);
        before - tools.len()
    }

    /// Replace the tools of `retired` owners with everything in `staged`,
    /// under a single write lock. Readers see either the old set or the new
    /// one.
    pub fn commit(&self, retired: &[&str], staged: DynamicToolSet) {
        let staged = match staged.tools.into_inner() {
            Ok(staged) => staged,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Ok(mut tools) = self.tools.write() else {
            return;
        };
        let before = tools.len();
        tools.retain(|t| !retired.contains(&t.owner.as_str()));
        let removed = before - tools.len();
        let added = staged.len();
        tools.extend(staged);
        debug!(removed, added, "Committed extension tools");
    }

    /// Catalog entries for every registered tool.
    pub fn catalog(&self) -> Vec<ToolCatalogItem> {
        self.tools
            .read()
            .map(|tools| {
                tools
                    .iter()
                    .map(|t| ToolCatalogItem {
                        name: t.definition.name.clone(),
                        description: t.definition.description.clone(),
                        parameters: t.definition.parameters.clone(),
                        source: ToolSource::Extension {
                            extension: t.owner.clone(),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn handler(&self, name: &str, owner: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools
            .read()
            .ok()?
            .iter()
            .find(|t| t.owner == owner && t.definition.name == name)
            .map(|t| Arc::clone(&t.handler))
    }

    pub fn len(&self) -> usize {
        self.tools.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DynamicToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicToolSet")
            .field("tools", &self.len())
            .finish()
    }
}
