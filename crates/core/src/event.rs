//! Event port: publish/subscribe between the engine, tools and extensions.
//!
//! One port is constructed per swarm runtime and handed down explicitly to
//! every agent instance, tool context and extension API. There is no global
//! bus. Named handlers registered with [`EventPort::on`] run synchronously on
//! the emitting task; every event is also broadcast to async subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::warn;

/// Emitted after a live patch is applied (when the policy asks for it).
pub const LIVE_CONFIG_CHANGED: &str = "liveConfig.changed";
/// Emitted when a live patch proposal is accepted into a log.
pub const LIVE_CONFIG_PATCH_PROPOSED: &str = "liveConfig.patchProposed";
/// Emitted by an OAuth collaborator once a pending authorization completes.
pub const AUTH_GRANTED: &str = "auth.granted";

/// A named event with an open JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub name: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Identifier returned by [`EventPort::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&RuntimeEvent) + Send + Sync>;

pub struct EventPort {
    sender: broadcast::Sender<Arc<RuntimeEvent>>,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventPort {
    /// Create a new event port with the given broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish an event to named handlers and broadcast subscribers.
    pub fn emit(&self, name: &str, payload: serde_json::Value) {
        let event = RuntimeEvent {
            name: name.to_string(),
            payload,
            timestamp: Utc::now(),
        };

        // Snapshot so a handler may call on/off without deadlocking.
        let handlers: Vec<Handler> = match self.handlers.read() {
            Ok(map) => map
                .get(name)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default(),
            Err(_) => {
                warn!(event = name, "Event handler table poisoned, skipping handlers");
                Vec::new()
            }
        };
        for handler in handlers {
            handler(&event);
        }

        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Register a handler for events with the given name.
    pub fn on<F>(&self, name: &str, handler: F) -> HandlerId
    where
        F: Fn(&RuntimeEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut map) = self.handlers.write() {
            map.entry(name.to_string())
                .or_default()
                .push((id, Arc::new(handler)));
        }
        id
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn off(&self, name: &str, id: HandlerId) -> bool {
        let Ok(mut map) = self.handlers.write() else {
            return false;
        };
        let Some(list) = map.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        before != list.len()
    }

    /// Subscribe to every event as an async stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RuntimeEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventPort {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPort").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn emit_reaches_broadcast_subscribers() {
        let port = EventPort::new(16);
        let mut rx = port.subscribe();

        port.emit(LIVE_CONFIG_CHANGED, serde_json::json!({"revision": 3}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, LIVE_CONFIG_CHANGED);
        assert_eq!(event.payload["revision"], 3);
    }

    #[test]
    fn named_handlers_only_see_their_event() {
        let port = EventPort::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        port.on(AUTH_GRANTED, move |e| sink.lock().unwrap().push(e.payload.clone()));

        port.emit(LIVE_CONFIG_PATCH_PROPOSED, serde_json::json!({}));
        port.emit(AUTH_GRANTED, serde_json::json!({"agentName": "a"}));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["agentName"], "a");
    }

    #[test]
    fn off_removes_handler() {
        let port = EventPort::default();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = port.on("x", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        port.emit("x", serde_json::Value::Null);
        assert!(port.off("x", id));
        assert!(!port.off("x", id));
        port.emit("x", serde_json::Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_without_subscribers_doesnt_panic() {
        let port = EventPort::new(4);
        port.emit("nobody.listens", serde_json::json!({"ok": true}));
    }
}
