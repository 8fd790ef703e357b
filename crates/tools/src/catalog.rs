//! Per-step tool catalog.

use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use swarmloop_core::tool::open_parameters_schema;
use swarmloop_core::{ConfigRegistry, Resource, ToolCatalogItem, ToolSource};

use crate::registry::DynamicToolSet;
use crate::remote::RemoteToolManager;

/// Merge static, extension-registered and remote tools into one catalog.
///
/// Static tools come first, then extension tools, then remote tools. When two
/// entries share a name the earliest one wins.
pub async fn build_tool_catalog(
    agent: &Value,
    registry: &dyn ConfigRegistry,
    dynamic: &DynamicToolSet,
    remote: &RemoteToolManager,
) -> Vec<ToolCatalogItem> {
    let mut catalog = Vec::new();
    let mut seen = HashSet::new();

    let candidates = static_tools(agent, registry)
        .into_iter()
        .chain(dynamic.catalog())
        .chain(remote.catalog().await);
    for item in candidates {
        if seen.insert(item.name.clone()) {
            catalog.push(item);
        } else {
            debug!(tool = %item.name, source = ?item.source, "Duplicate tool name dropped from catalog");
        }
    }
    catalog
}

/// Catalog entries for the `Tool` resources referenced at `/tools`.
///
/// A tool resource lists its callable exports at `spec.exports`. A resource
/// without exports is a single tool named after the resource.
pub fn static_tools(agent: &Value, registry: &dyn ConfigRegistry) -> Vec<ToolCatalogItem> {
    let Some(entries) = agent.pointer("/tools").and_then(Value::as_array) else {
        return Vec::new();
    };
    registry
        .expand(entries, "Tool")
        .iter()
        .flat_map(exports_of)
        .collect()
}

fn exports_of(tool: &Resource) -> Vec<ToolCatalogItem> {
    let item = |name: &str, spec: &Value| ToolCatalogItem {
        name: name.to_string(),
        description: spec
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        parameters: spec
            .get("parameters")
            .filter(|p| p.is_object())
            .cloned()
            .unwrap_or_else(open_parameters_schema),
        source: ToolSource::Static {
            tool: tool.name.clone(),
        },
    };

    match tool.spec.get("exports").and_then(Value::as_array) {
        Some(exports) => exports
            .iter()
            .filter_map(|export| {
                let name = export.get("name").and_then(Value::as_str)?;
                Some(item(name, export))
            })
            .collect(),
        None => vec![item(&tool.name, &tool.spec)],
    }
}
