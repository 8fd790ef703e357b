//! On-disk layout of a live config scope directory.
//!
//! ```text
//! <state_dir>/<instance>/agents/<agent>/live-config/
//!     patches.jsonl   append-only agent patch log
//!     status.jsonl    evaluation records for this agent (both scopes)
//!     cursor.json     read-up-to positions and effective revision
//!     overlay.json    last agent overlay snapshot
//!     effective/effective-<revision>.json
//!     .lock
//! <state_dir>/<instance>/swarm/live-config/
//!     patches.jsonl   append-only swarm patch log
//!     overlay.json    swarm overlay snapshot and applied patch names
//!     .lock
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use swarmloop_core::{LiveConfigError, LivePatch};

/// One scope directory.
#[derive(Debug, Clone)]
pub struct ScopeStore {
    dir: PathBuf,
}

impl ScopeStore {
    pub fn agent(state_dir: &Path, instance_id: &str, agent: &str) -> Self {
        Self {
            dir: state_dir
                .join(instance_id)
                .join("agents")
                .join(agent)
                .join("live-config"),
        }
    }

    pub fn swarm(state_dir: &Path, instance_id: &str) -> Self {
        Self {
            dir: state_dir.join(instance_id).join("swarm").join("live-config"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn patches_path(&self) -> PathBuf {
        self.dir.join("patches.jsonl")
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join("status.jsonl")
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.dir.join("cursor.json")
    }

    pub fn overlay_path(&self) -> PathBuf {
        self.dir.join("overlay.json")
    }

    pub fn effective_path(&self, revision: u64) -> PathBuf {
        self.dir
            .join("effective")
            .join(format!("effective-{revision}.json"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(".lock")
    }

    pub async fn read_patches(&self) -> Result<Vec<LivePatch>, LiveConfigError> {
        read_jsonl(&self.patches_path()).await
    }

    pub async fn append_patch(&self, patch: &LivePatch) -> Result<(), LiveConfigError> {
        append_jsonl(&self.patches_path(), patch).await
    }
}

// ── Cursor ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCursor {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluated_patch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_patch_name: Option<String>,
}

impl Default for LogCursor {
    fn default() -> Self {
        Self {
            format: "jsonl".into(),
            last_evaluated_patch_name: None,
            last_applied_patch_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveCursor {
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_at: Option<DateTime<Utc>>,
}

/// Per-agent read positions in both logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub version: u32,
    #[serde(default)]
    pub patch_log: LogCursor,
    #[serde(default)]
    pub swarm_patch_log: LogCursor,
    #[serde(default)]
    pub effective: EffectiveCursor,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            version: 1,
            patch_log: LogCursor::default(),
            swarm_patch_log: LogCursor::default(),
            effective: EffectiveCursor::default(),
        }
    }
}

// ── Snapshots ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub revision: u64,
    pub agent: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmSnapshot {
    pub swarm: serde_json::Value,
    #[serde(default)]
    pub applied_patches: Vec<String>,
}

// ── File helpers ──────────────────────────────────────────────────────────

fn storage(path: &Path) -> impl FnOnce(std::io::Error) -> LiveConfigError + '_ {
    move |source| LiveConfigError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

async fn ensure_parent(path: &Path) -> Result<(), LiveConfigError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(storage(parent))?;
    }
    Ok(())
}

/// Append one JSON line, creating the file and its parents on demand.
pub async fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<(), LiveConfigError> {
    ensure_parent(path).await?;
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(storage(path))?;
    file.write_all(line.as_bytes()).await.map_err(storage(path))?;
    file.flush().await.map_err(storage(path))?;
    Ok(())
}

/// Read every parseable line. Corrupted lines are skipped with a warning.
pub async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LiveConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage(path)(e)),
    };

    let mut entries = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping corrupted log line");
            }
        }
    }
    Ok(entries)
}

/// Read a JSON document, `None` if the file is missing or unreadable as `T`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, LiveConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(storage(path)(e)),
    };
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable document");
            Ok(None)
        }
    }
}

/// Write a pretty JSON document through a temp file and rename.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LiveConfigError> {
    ensure_parent(path).await?;
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await.map_err(storage(&tmp))?;
    tokio::fs::rename(&tmp, path).await.map_err(storage(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn jsonl_append_and_read_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.jsonl");

        append_jsonl(&path, &json!({"n": 1})).await.unwrap();
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap()
            .write_all(b"{broken\n")
            .await
            .unwrap();
        append_jsonl(&path, &json!({"n": 2})).await.unwrap();

        let entries: Vec<serde_json::Value> = read_jsonl(&path).await.unwrap();
        assert_eq!(entries, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn missing_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries: Vec<serde_json::Value> =
            read_jsonl(&dir.path().join("none.jsonl")).await.unwrap();
        assert!(entries.is_empty());
        let doc: Option<Cursor> = read_json(&dir.path().join("cursor.json")).await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn cursor_round_trips_with_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScopeStore::agent(dir.path(), "inst", "planner");
        let mut cursor = Cursor::default();
        cursor.swarm_patch_log.last_evaluated_patch_name = Some("p-000002".into());
        cursor.effective.revision = 4;

        write_json(&store.cursor_path(), &cursor).await.unwrap();
        let raw = tokio::fs::read_to_string(store.cursor_path()).await.unwrap();
        assert!(raw.contains("swarmPatchLog"));
        assert!(raw.contains("lastEvaluatedPatchName"));

        let back: Cursor = read_json(&store.cursor_path()).await.unwrap().unwrap();
        assert_eq!(back, cursor);
    }

    #[test]
    fn layout_paths() {
        let agent = ScopeStore::agent(Path::new("/state"), "i1", "planner");
        assert_eq!(
            agent.patches_path(),
            PathBuf::from("/state/i1/agents/planner/live-config/patches.jsonl")
        );
        assert_eq!(
            agent.effective_path(3),
            PathBuf::from("/state/i1/agents/planner/live-config/effective/effective-3.json")
        );
        let swarm = ScopeStore::swarm(Path::new("/state"), "i1");
        assert_eq!(swarm.lock_path(), PathBuf::from("/state/i1/swarm/live-config/.lock"));
    }
}
