//! Remote tool servers.
//!
//! An agent document lists `McpServer` resources at `/mcpServers`. Each one
//! is turned into a live [`RemoteToolServer`] connection by the injected
//! [`RemoteConnector`]; the transport (stdio child process, HTTP, ...) is the
//! connector's business. The [`RemoteToolManager`] keeps the set of attached
//! servers in sync with the desired list and exposes their tools to the
//! catalog as `<server>.<tool>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use swarmloop_core::tool::open_parameters_schema;
use swarmloop_core::{Resource, ToolCatalogItem, ToolError, ToolSource};

/// A tool advertised by a remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "open_parameters_schema", alias = "inputSchema")]
    pub parameters: serde_json::Value,
}

/// A live connection to one remote tool server.
#[async_trait]
pub trait RemoteToolServer: Send + Sync {
    /// List available tools from this server.
    async fn list_tools(&self) -> Result<Vec<RemoteToolDefinition>, ToolError>;

    /// Call a tool on this server.
    async fn call_tool(
        &self,
        tool: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;

    /// Shut the connection down. Called when the server is detached.
    async fn close(&self) {}
}

/// Creates connections for `McpServer` resources.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, server: &Resource) -> Result<Arc<dyn RemoteToolServer>, ToolError>;
}

/// Connector used when the host wires none; every attach fails.
#[derive(Debug, Default)]
pub struct NoRemoteConnector;

#[async_trait]
impl RemoteConnector for NoRemoteConnector {
    async fn connect(&self, server: &Resource) -> Result<Arc<dyn RemoteToolServer>, ToolError> {
        Err(ToolError::RemoteUnavailable {
            server: server.name.clone(),
            reason: "no remote connector configured".into(),
        })
    }
}

/// Stable identity of a server declaration: name plus the serialized spec.
pub fn server_identity(server: &Resource) -> String {
    format!("{}/{}:{}", server.kind, server.name, server.spec)
}

struct Attached {
    name: String,
    identity: String,
    server: Arc<dyn RemoteToolServer>,
    tools: Vec<RemoteToolDefinition>,
}

/// The remote servers currently attached to one agent.
pub struct RemoteToolManager {
    connector: Arc<dyn RemoteConnector>,
    servers: RwLock<Vec<Attached>>,
}

impl RemoteToolManager {
    pub fn new(connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            connector,
            servers: RwLock::new(Vec::new()),
        }
    }

    /// Attach and detach servers so the attached set equals `desired`.
    ///
    /// Servers whose identity is unchanged keep their connection. If any new
    /// connection fails, connections opened during this call are closed and
    /// the previous set stays attached.
    pub async fn sync(&self, desired: &[Resource]) -> Result<(), ToolError> {
        let current: Vec<(String, Arc<dyn RemoteToolServer>, Vec<RemoteToolDefinition>)> = self
            .servers
            .read()
            .await
            .iter()
            .map(|a| (a.identity.clone(), Arc::clone(&a.server), a.tools.clone()))
            .collect();

        let mut next: Vec<Attached> = Vec::with_capacity(desired.len());
        let mut opened: Vec<Arc<dyn RemoteToolServer>> = Vec::new();

        for resource in desired {
            let identity = server_identity(resource);
            if let Some((_, server, tools)) = current.iter().find(|(id, _, _)| *id == identity) {
                next.push(Attached {
                    name: resource.name.clone(),
                    identity,
                    server: Arc::clone(server),
                    tools: tools.clone(),
                });
                continue;
            }

            let attached = match self.connector.connect(resource).await {
                Ok(server) => {
                    opened.push(Arc::clone(&server));
                    server.list_tools().await.map(|tools| (server, tools))
                }
                Err(e) => Err(e),
            };
            match attached {
                Ok((server, tools)) => {
                    info!(server = %resource.name, tool_count = tools.len(), "Remote tool server attached");
                    next.push(Attached {
                        name: resource.name.clone(),
                        identity,
                        server,
                        tools,
                    });
                }
                Err(e) => {
                    warn!(server = %resource.name, error = %e, "Remote tool server failed to attach");
                    for server in opened {
                        server.close().await;
                    }
                    return Err(e);
                }
            }
        }

        let removed: Vec<Arc<dyn RemoteToolServer>> = {
            let mut servers = self.servers.write().await;
            let old = std::mem::replace(&mut *servers, next);
            let kept: Vec<String> = servers.iter().map(|a| a.identity.clone()).collect();
            old.into_iter()
                .filter(|a| !kept.contains(&a.identity))
                .map(|a| {
                    info!(server = %a.name, "Remote tool server detached");
                    a.server
                })
                .collect()
        };
        for server in removed {
            server.close().await;
        }
        Ok(())
    }

    /// Catalog entries for every tool of every attached server.
    pub async fn catalog(&self) -> Vec<ToolCatalogItem> {
        let servers = self.servers.read().await;
        servers
            .iter()
            .flat_map(|a| {
                a.tools.iter().map(move |t| ToolCatalogItem {
                    name: format!("{}.{}", a.name, t.name),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                    source: ToolSource::Remote {
                        server: a.name.clone(),
                        tool: t.name.clone(),
                    },
                })
            })
            .collect()
    }

    /// Call a tool on an attached server.
    pub async fn call(
        &self,
        server: &str,
        tool: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let handle = self
            .servers
            .read()
            .await
            .iter()
            .find(|a| a.name == server)
            .map(|a| Arc::clone(&a.server));
        match handle {
            Some(handle) => handle.call_tool(tool, input).await,
            None => Err(ToolError::RemoteUnavailable {
                server: server.to_string(),
                reason: "server is not attached".into(),
            }),
        }
    }

    /// Names of the attached servers, in declaration order.
    pub async fn attached(&self) -> Vec<String> {
        self.servers.read().await.iter().map(|a| a.name.clone()).collect()
    }

    /// Detach every server.
    pub async fn close_all(&self) {
        let servers = std::mem::take(&mut *self.servers.write().await);
        for attached in servers {
            attached.server.close().await;
        }
    }
}

impl Default for RemoteToolManager {
    fn default() -> Self {
        Self::new(Arc::new(NoRemoteConnector))
    }
}

impl std::fmt::Debug for RemoteToolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteToolManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeServer {
        tools: Vec<&'static str>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteToolServer for FakeServer {
        async fn list_tools(&self) -> Result<Vec<RemoteToolDefinition>, ToolError> {
            Ok(self
                .tools
                .iter()
                .map(|n| RemoteToolDefinition {
                    name: n.to_string(),
                    description: String::new(),
                    parameters: open_parameters_schema(),
                })
                .collect())
        }

        async fn call_tool(
            &self,
            tool: &str,
            input: serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(json!({"tool": tool, "input": input}))
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        connects: Mutex<Vec<String>>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteConnector for FakeConnector {
        async fn connect(&self, server: &Resource) -> Result<Arc<dyn RemoteToolServer>, ToolError> {
            if server.spec["broken"] == true {
                return Err(ToolError::RemoteUnavailable {
                    server: server.name.clone(),
                    reason: "refused".into(),
                });
            }
            self.connects.lock().unwrap().push(server.name.clone());
            Ok(Arc::new(FakeServer {
                tools: vec!["search", "open"],
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    fn server(name: &str, spec: serde_json::Value) -> Resource {
        Resource::new("McpServer", name, spec)
    }

    #[tokio::test]
    async fn sync_attaches_and_names_tools_by_server() {
        let connector = Arc::new(FakeConnector::default());
        let manager = RemoteToolManager::new(connector.clone());
        manager.sync(&[server("github", json!({}))]).await.unwrap();

        let catalog = manager.catalog().await;
        let names: Vec<_> = catalog.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["github.search", "github.open"]);

        let out = manager.call("github", "search", json!({"q": 1})).await.unwrap();
        assert_eq!(out["tool"], "search");
    }

    #[tokio::test]
    async fn unchanged_servers_keep_their_connection() {
        let connector = Arc::new(FakeConnector::default());
        let manager = RemoteToolManager::new(connector.clone());
        let a = server("a", json!({"url": "x"}));
        let b = server("b", json!({}));

        manager.sync(&[a.clone()]).await.unwrap();
        manager.sync(&[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(*connector.connects.lock().unwrap(), vec!["a", "b"]);

        // Changing the spec reconnects; dropping a server closes it.
        let a2 = server("a", json!({"url": "y"}));
        manager.sync(&[a2]).await.unwrap();
        assert_eq!(connector.connects.lock().unwrap().len(), 3);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 2);
        assert_eq!(manager.attached().await, vec!["a"]);
    }

    #[tokio::test]
    async fn failed_attach_keeps_previous_set() {
        let connector = Arc::new(FakeConnector::default());
        let manager = RemoteToolManager::new(connector.clone());
        manager.sync(&[server("a", json!({}))]).await.unwrap();

        let err = manager
            .sync(&[server("b", json!({})), server("c", json!({"broken": true}))])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::RemoteUnavailable { .. }));
        assert_eq!(manager.attached().await, vec!["a"]);
        // "b" was opened during the failed pass and closed again.
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn calling_a_detached_server_fails() {
        let manager = RemoteToolManager::default();
        let err = manager.call("nope", "x", json!({})).await.unwrap_err();
        assert_eq!(err.code(), "E_TOOL_REMOTE_UNAVAILABLE");
    }
}
