//! Live configuration patches, their evaluation statuses and the effective
//! configuration they produce.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LiveConfigError;
use crate::resource::ObjectRef;

/// Patch document type accepted by the live config manager.
pub const JSON6902: &str = "json6902";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchScope {
    Agent,
    Swarm,
}

impl std::fmt::Display for PatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchScope::Agent => f.write_str("agent"),
            PatchScope::Swarm => f.write_str("swarm"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

/// One JSON-Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl PatchOp {
    pub fn replace(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: PatchOpKind::Replace,
            path: path.into(),
            from: None,
            value: Some(value),
        }
    }

    pub fn add(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: PatchOpKind::Add,
            path: path.into(),
            from: None,
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Remove,
            path: path.into(),
            from: None,
            value: None,
        }
    }

    /// Every JSON pointer this op reads or writes.
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.from.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub ops: Vec<PatchOp>,
}

/// Who proposed a patch. `kind` is one of tool, extension, sidecar, system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PatchSource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: Some(name.into()),
        }
    }
}

/// A not-yet-normalized patch proposal.
///
/// `patch` stays a raw value so the manager can reject malformed documents
/// with a precise reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProposal {
    #[serde(default)]
    pub scope: Option<PatchScope>,
    #[serde(default)]
    pub target: Option<ObjectRef>,
    #[serde(default)]
    pub apply_at: Option<String>,
    pub patch: serde_json::Value,
    #[serde(default)]
    pub source: Option<PatchSource>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl PatchProposal {
    /// A json6902 proposal for the given ops.
    pub fn json6902(ops: Vec<PatchOp>) -> Self {
        Self {
            patch: serde_json::json!({ "type": JSON6902, "ops": ops }),
            ..Default::default()
        }
    }

    pub fn scope(mut self, scope: PatchScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn target(mut self, target: ObjectRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn apply_at(mut self, point: impl Into<String>) -> Self {
        self.apply_at = Some(point.into());
        self
    }

    pub fn source(mut self, source: PatchSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePatchSpec {
    pub scope: PatchScope,
    pub target: ObjectRef,
    pub apply_at: String,
    pub patch: PatchDocument,
    pub source: PatchSource,
    #[serde(default)]
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// An appended, immutable patch log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePatch {
    /// Monotonic per-log name, `p-000001`.
    pub name: String,
    /// Absent only in damaged log lines.
    #[serde(default)]
    pub spec: Option<LivePatchSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchResult {
    Pending,
    Applied,
    Rejected,
    Failed,
}

/// One evaluation record in an agent's status log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePatchStatus {
    pub patch_name: String,
    pub agent_name: String,
    pub result: PatchResult,
    pub evaluated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_revision: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_in_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Current overlay documents plus a monotonic revision counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub swarm: serde_json::Value,
    pub agent: serde_json::Value,
    pub revision: u64,
}

/// Capability to propose patches on behalf of one agent.
#[async_trait]
pub trait LiveConfigPort: Send + Sync {
    async fn propose_patch(
        &self,
        proposal: PatchProposal,
    ) -> std::result::Result<LivePatch, LiveConfigError>;
}

/// A port that refuses every proposal; used where no manager is attached.
#[derive(Debug, Default)]
pub struct DetachedLiveConfig;

#[async_trait]
impl LiveConfigPort for DetachedLiveConfig {
    async fn propose_patch(
        &self,
        _proposal: PatchProposal,
    ) -> std::result::Result<LivePatch, LiveConfigError> {
        Err(LiveConfigError::InvalidProposal(
            "no live config manager attached".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ops_parse_from_rfc6902_json() {
        let doc: PatchDocument = serde_json::from_value(json!({
            "type": "json6902",
            "ops": [
                {"op": "replace", "path": "/policy/maxStepsPerTurn", "value": 4},
                {"op": "move", "from": "/a", "path": "/b"}
            ]
        }))
        .unwrap();
        assert_eq!(doc.ops[0].op, PatchOpKind::Replace);
        let touched: Vec<_> = doc.ops[1].touched_paths().collect();
        assert_eq!(touched, vec!["/b", "/a"]);
    }

    #[test]
    fn unknown_op_is_rejected() {
        let err = serde_json::from_value::<PatchOp>(json!({"op": "merge", "path": "/a"}));
        assert!(err.is_err());
    }

    #[test]
    fn status_skips_empty_optionals() {
        let status = LivePatchStatus {
            patch_name: "p-000001".into(),
            agent_name: "planner".into(),
            result: PatchResult::Pending,
            evaluated_at: Utc::now(),
            applied_at: None,
            effective_revision: None,
            applied_in_step_id: None,
            reason: Some("proposed".into()),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["result"], "pending");
        assert!(value.get("appliedAt").is_none());
        assert_eq!(value["patchName"], "p-000001");
    }

    #[tokio::test]
    async fn detached_port_refuses() {
        let port = DetachedLiveConfig;
        let err = port
            .propose_patch(PatchProposal::json6902(vec![PatchOp::remove("/x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LiveConfigError::InvalidProposal(_)));
    }
}
