//! JSON Patch (RFC 6902) application on top of the `json-patch` crate.
//!
//! [`apply_patch`] is all-or-nothing: when any operation fails every earlier
//! one is rolled back and the document is left as it was.

use serde_json::Value;
use swarmloop_core::PatchOp;

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// An operation is missing a member its kind requires.
    #[error("malformed operation at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error(transparent)]
    Apply(#[from] json_patch::PatchError),
}

/// Apply `ops` to `doc` atomically.
pub fn apply_patch(doc: &mut Value, ops: &[PatchOp]) -> Result<(), PatchError> {
    let patch = json_patch::Patch(ops.iter().map(to_operation).collect::<Result<_, _>>()?);
    json_patch::patch(doc, &patch)?;
    Ok(())
}

fn to_operation(op: &PatchOp) -> Result<json_patch::PatchOperation, PatchError> {
    let malformed = |reason: String| PatchError::Malformed {
        path: op.path.clone(),
        reason,
    };
    let raw = serde_json::to_value(op).map_err(|e| malformed(e.to_string()))?;
    serde_json::from_value(raw).map_err(|e| malformed(e.to_string()))
}
