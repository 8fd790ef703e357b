//! Per-extension state that survives reconciliation.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle to one extension's state bag.
///
/// Cloning the handle shares the bag; callbacks registered by the extension
/// capture a clone and keep seeing the same state across reloads.
#[derive(Debug, Clone, Default)]
pub struct ExtensionState {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl ExtensionState {
    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.lock().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    /// Run `f` with exclusive access to the whole bag.
    pub fn update<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }
}

/// All state bags of one agent, keyed by extension name. Never reset.
#[derive(Debug, Default)]
pub struct ExtensionStateArena {
    states: Mutex<HashMap<String, ExtensionState>>,
}

impl ExtensionStateArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bag for `extension`, created empty on first use.
    pub fn handle(&self, extension: &str) -> ExtensionState {
        let mut states = self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        states.entry(extension.to_string()).or_default().clone()
    }

    pub fn names(&self) -> Vec<String> {
        let states = self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = states.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handles_share_one_bag_per_extension() {
        let arena = ExtensionStateArena::new();
        arena.handle("memo").set("count", json!(1));

        let again = arena.handle("memo");
        assert_eq!(again.get("count"), Some(json!(1)));
        assert!(arena.handle("other").get("count").is_none());
        assert_eq!(arena.names(), vec!["memo", "other"]);
    }

    #[test]
    fn update_sees_the_whole_bag() {
        let state = ExtensionState::default();
        state.set("hits", json!(2));
        let hits = state.update(|bag| {
            let next = bag.get("hits").and_then(Value::as_i64).unwrap_or(0) + 1;
            bag.insert("hits".into(), json!(next));
            next
        });
        assert_eq!(hits, 3);
        assert_eq!(state.snapshot()["hits"], 3);
        assert_eq!(state.remove("hits"), Some(json!(3)));
    }
}
