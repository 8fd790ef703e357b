//! Typed configuration resources and the registry that resolves them.
//!
//! Swarms, agents, tools, extensions and remote tool servers are all
//! delivered to the engine as [`Resource`] documents. Loading them from disk
//! or a package registry is somebody else's job: the engine only consumes a
//! [`ConfigRegistry`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A reference to a resource: `{kind, name, package?}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl ObjectRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            package: None,
        }
    }

    /// Parse a reference from a document value.
    ///
    /// Accepts `"Kind/name"`, a bare `"name"` (using `default_kind`), or an
    /// object with `kind`, `name` and optional `package`.
    pub fn from_value(value: &serde_json::Value, default_kind: &str) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => match s.split_once('/') {
                Some((kind, name)) if !kind.is_empty() && !name.is_empty() => {
                    Some(Self::new(kind, name))
                }
                _ if !s.is_empty() => Some(Self::new(default_kind, s.as_str())),
                _ => None,
            },
            serde_json::Value::Object(map) => {
                let name = map.get("name")?.as_str()?;
                let kind = map
                    .get("kind")
                    .and_then(|k| k.as_str())
                    .unwrap_or(default_kind);
                Some(Self {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    package: map
                        .get("package")
                        .and_then(|p| p.as_str())
                        .map(str::to_string),
                })
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.package {
            Some(pkg) => write!(f, "{}/{}@{}", self.kind, self.name, pkg),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A typed configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl Resource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, spec: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            package: None,
            labels: BTreeMap::new(),
            spec,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: self.kind.clone(),
            name: self.name.clone(),
            package: self.package.clone(),
        }
    }

    fn matches(&self, r: &ObjectRef) -> bool {
        self.kind == r.kind
            && self.name == r.name
            && (r.package.is_none() || r.package == self.package)
    }
}

/// Resolves references and expands selector lists into resources.
pub trait ConfigRegistry: Send + Sync {
    /// Resolve a single reference.
    fn resolve(&self, reference: &ObjectRef) -> Option<Resource>;

    /// All resources of a kind, in registration order.
    fn list(&self, kind: &str) -> Vec<Resource>;

    /// Expand a list of references and `{selector: {kind, matchLabels}}`
    /// entries into resources. Unresolvable entries are skipped; duplicates
    /// keep their first position.
    fn expand(&self, entries: &[serde_json::Value], default_kind: &str) -> Vec<Resource> {
        let mut out: Vec<Resource> = Vec::new();
        for entry in entries {
            let found = match entry.get("selector") {
                Some(selector) => {
                    let kind = selector
                        .get("kind")
                        .and_then(|k| k.as_str())
                        .unwrap_or(default_kind);
                    let labels = selector
                        .get("matchLabels")
                        .and_then(|l| l.as_object())
                        .cloned()
                        .unwrap_or_default();
                    self.list(kind)
                        .into_iter()
                        .filter(|r| {
                            labels.iter().all(|(k, v)| {
                                v.as_str().is_some_and(|v| r.labels.get(k).map(String::as_str) == Some(v))
                            })
                        })
                        .collect()
                }
                None => ObjectRef::from_value(entry, default_kind)
                    .and_then(|r| self.resolve(&r))
                    .into_iter()
                    .collect::<Vec<_>>(),
            };
            for resource in found {
                if !out.iter().any(|r| r.kind == resource.kind && r.name == resource.name) {
                    out.push(resource);
                }
            }
        }
        out
    }
}

/// A registry holding resources in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    resources: RwLock<Vec<Resource>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a resource (matched by kind, name and package).
    pub fn insert(&self, resource: Resource) {
        if let Ok(mut all) = self.resources.write() {
            let r = resource.object_ref();
            match all.iter_mut().find(|existing| existing.matches(&r)) {
                Some(slot) => *slot = resource,
                None => all.push(resource),
            }
        }
    }

    pub fn with(self, resource: Resource) -> Self {
        self.insert(resource);
        self
    }
}

impl ConfigRegistry for InMemoryRegistry {
    fn resolve(&self, reference: &ObjectRef) -> Option<Resource> {
        self.resources
            .read()
            .ok()?
            .iter()
            .find(|r| r.matches(reference))
            .cloned()
    }

    fn list(&self, kind: &str) -> Vec<Resource> {
        self.resources
            .read()
            .map(|all| all.iter().filter(|r| r.kind == kind).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_reference_forms() {
        assert_eq!(
            ObjectRef::from_value(&json!("Tool/search"), "Tool"),
            Some(ObjectRef::new("Tool", "search"))
        );
        assert_eq!(
            ObjectRef::from_value(&json!("search"), "Tool"),
            Some(ObjectRef::new("Tool", "search"))
        );
        let with_pkg = ObjectRef::from_value(
            &json!({"kind": "Extension", "name": "memo", "package": "core"}),
            "Tool",
        )
        .unwrap();
        assert_eq!(with_pkg.kind, "Extension");
        assert_eq!(with_pkg.package.as_deref(), Some("core"));
        assert!(ObjectRef::from_value(&json!(42), "Tool").is_none());
    }

    #[test]
    fn registry_resolves_and_expands_selectors() {
        let registry = InMemoryRegistry::new()
            .with(Resource::new("Tool", "a", json!({})).with_label("team", "ops"))
            .with(Resource::new("Tool", "b", json!({})))
            .with(Resource::new("Tool", "c", json!({})).with_label("team", "ops"));

        assert!(registry.resolve(&ObjectRef::new("Tool", "b")).is_some());
        assert!(registry.resolve(&ObjectRef::new("Tool", "zzz")).is_none());

        let expanded = registry.expand(
            &[
                json!("Tool/b"),
                json!({"selector": {"kind": "Tool", "matchLabels": {"team": "ops"}}}),
                json!("a"),
            ],
            "Tool",
        );
        let names: Vec<_> = expanded.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn insert_replaces_existing() {
        let registry = InMemoryRegistry::new();
        registry.insert(Resource::new("Agent", "x", json!({"v": 1})));
        registry.insert(Resource::new("Agent", "x", json!({"v": 2})));
        assert_eq!(registry.list("Agent").len(), 1);
        assert_eq!(registry.list("Agent")[0].spec["v"], 2);
    }
}
