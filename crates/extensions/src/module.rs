//! Extension module contracts and a static loader.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use swarmloop_core::{ExtensionError, Resource};

use crate::api::ExtensionApi;

/// A loaded extension.
///
/// `register` is called on every reconciliation that (re)builds the agent's
/// pipeline. It must register everything again: interceptors and tools from
/// a previous registration are gone by the time it runs.
#[async_trait]
pub trait ExtensionModule: Send + Sync {
    async fn register(&self, api: &mut ExtensionApi<'_>) -> Result<(), ExtensionError>;
}

/// Turns an `Extension` resource into a module.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, extension: &Resource) -> Result<Arc<dyn ExtensionModule>, ExtensionError>;
}

/// The entry key of an extension: `spec.entry` when set, else its name.
pub fn entry_key(extension: &Resource) -> &str {
    extension
        .spec
        .get("entry")
        .and_then(Value::as_str)
        .unwrap_or(&extension.name)
}

/// A loader over modules compiled into the host, keyed by entry.
#[derive(Default)]
pub struct StaticModuleLoader {
    modules: HashMap<String, Arc<dyn ExtensionModule>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entry: impl Into<String>, module: Arc<dyn ExtensionModule>) -> Self {
        self.modules.insert(entry.into(), module);
        self
    }

    pub fn insert(&mut self, entry: impl Into<String>, module: Arc<dyn ExtensionModule>) {
        self.modules.insert(entry.into(), module);
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn load(&self, extension: &Resource) -> Result<Arc<dyn ExtensionModule>, ExtensionError> {
        let entry = entry_key(extension);
        self.modules
            .get(entry)
            .cloned()
            .ok_or_else(|| ExtensionError::LoadFailed {
                name: extension.name.clone(),
                reason: format!("no module registered for entry '{entry}'"),
            })
    }
}

impl std::fmt::Debug for StaticModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<&String> = self.modules.keys().collect();
        entries.sort();
        f.debug_struct("StaticModuleLoader")
            .field("entries", &entries)
            .finish()
    }
}
