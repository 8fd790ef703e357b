//! LiveConfigManager: proposal logs and safe-point application.
//!
//! Proposals are appended to a per-scope log and never touch running state.
//! At a safe point each agent reads the swarm log and then its own log past
//! its cursor, evaluates every new patch, applies the accepted ones to its
//! in-memory overlays and records one status entry per patch.
//!
//! The swarm overlay and the set of applied swarm patches are shared by all
//! agents of one manager, so a swarm patch is applied at most once even
//! though every agent evaluates the swarm log.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use async_trait::async_trait;
use swarmloop_config::{LiveConfigPolicy, agent_allowed_paths};
use swarmloop_core::event::{LIVE_CONFIG_CHANGED, LIVE_CONFIG_PATCH_PROPOSED};
use swarmloop_core::live_patch::{JSON6902, PatchDocument};
use swarmloop_core::{
    EffectiveConfig, EventPort, LiveConfigError, LiveConfigPort, LivePatch, LivePatchSpec,
    LivePatchStatus, ObjectRef, PatchOp, PatchProposal, PatchResult, PatchScope, PatchSource,
};

use crate::lock::{PidFileLock, ScopeLock};
use crate::patch::apply_patch;
use crate::store::{
    AgentSnapshot, Cursor, ScopeStore, SwarmSnapshot, append_jsonl, read_json, read_jsonl,
    write_json,
};

/// Point at which patches apply unless the proposal says otherwise.
pub const DEFAULT_APPLY_POINT: &str = "step.config";

const SOURCE_TYPES: &[&str] = &["tool", "extension", "sidecar", "system"];

/// Construction parameters.
#[derive(Debug, Clone)]
pub struct LiveConfigOptions {
    pub instance_id: String,
    pub swarm_name: String,
    /// Base swarm document; also carries the policy at `/policy/liveConfig`.
    pub swarm_config: serde_json::Value,
    pub state_dir: PathBuf,
    pub write_snapshots: bool,
}

struct AgentState {
    store: ScopeStore,
    base: serde_json::Value,
    overlay: serde_json::Value,
    revision: u64,
    cursor: Cursor,
}

struct SwarmState {
    store: ScopeStore,
    overlay: serde_json::Value,
    applied: HashSet<String>,
    initialized: bool,
}

struct ManagerState {
    swarm: SwarmState,
    agents: HashMap<String, AgentState>,
    /// Last assigned patch number per log file.
    counters: HashMap<PathBuf, u64>,
}

pub struct LiveConfigManager {
    options: LiveConfigOptions,
    policy: LiveConfigPolicy,
    lock: Arc<dyn ScopeLock>,
    events: Option<Arc<EventPort>>,
    state: Mutex<ManagerState>,
}

impl LiveConfigManager {
    pub fn new(options: LiveConfigOptions) -> Self {
        let policy = LiveConfigPolicy::from_swarm(&options.swarm_config);
        let swarm = SwarmState {
            store: ScopeStore::swarm(&options.state_dir, &options.instance_id),
            overlay: options.swarm_config.clone(),
            applied: HashSet::new(),
            initialized: false,
        };
        Self {
            options,
            policy,
            lock: Arc::new(PidFileLock),
            events: None,
            state: Mutex::new(ManagerState {
                swarm,
                agents: HashMap::new(),
                counters: HashMap::new(),
            }),
        }
    }

    /// Emit `liveConfig.*` events on this port.
    pub fn with_events(mut self, events: Arc<EventPort>) -> Self {
        self.events = Some(events);
        self
    }

    /// Replace the advisory lock strategy.
    pub fn with_lock(mut self, lock: Arc<dyn ScopeLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn policy(&self) -> &LiveConfigPolicy {
        &self.policy
    }

    pub fn swarm_name(&self) -> &str {
        &self.options.swarm_name
    }

    fn acquire_lock(&self, store: &ScopeStore) {
        if let Err(e) = self.lock.acquire(&store.lock_path()) {
            warn!(path = %store.lock_path().display(), error = %e, "Could not take live config lock");
        }
    }

    fn emit(&self, name: &str, payload: serde_json::Value) {
        if let Some(events) = &self.events {
            events.emit(name, payload);
        }
    }

    /// Prepare stores, locks and in-memory state for an agent.
    ///
    /// Restores the cursor and, when a matching snapshot exists, the agent
    /// overlay. Calling it again for the same agent is a no-op.
    pub async fn init_agent(
        &self,
        agent_name: &str,
        agent_config: serde_json::Value,
    ) -> Result<(), LiveConfigError> {
        let mut state = self.state.lock().await;

        if !state.swarm.initialized {
            self.acquire_lock(&state.swarm.store);
            let snapshot_path = state.swarm.store.overlay_path();
            if let Some(snapshot) = read_json::<SwarmSnapshot>(&snapshot_path).await? {
                debug!(applied = snapshot.applied_patches.len(), "Restored swarm overlay snapshot");
                state.swarm.overlay = snapshot.swarm;
                state.swarm.applied = snapshot.applied_patches.into_iter().collect();
            }
            state.swarm.initialized = true;
        }

        if state.agents.contains_key(agent_name) {
            return Ok(());
        }

        let store = ScopeStore::agent(&self.options.state_dir, &self.options.instance_id, agent_name);
        self.acquire_lock(&store);

        let cursor = read_json::<Cursor>(&store.cursor_path())
            .await?
            .unwrap_or_default();
        let revision = cursor.effective.revision;

        let mut overlay = agent_config.clone();
        if revision > 0 {
            match read_json::<AgentSnapshot>(&store.overlay_path()).await? {
                Some(snapshot) if snapshot.revision == revision => overlay = snapshot.agent,
                _ => warn!(
                    agent = agent_name,
                    revision, "No overlay snapshot for restored revision, starting from base document"
                ),
            }
        }

        info!(agent = agent_name, revision, dir = %store.dir().display(), "Live config initialized");
        state.agents.insert(
            agent_name.to_string(),
            AgentState {
                store,
                base: agent_config,
                overlay,
                revision,
                cursor,
            },
        );
        Ok(())
    }

    /// Validate, name and append a proposal; record it as pending.
    pub async fn propose_patch(
        &self,
        proposal: PatchProposal,
        agent_name: &str,
    ) -> Result<LivePatch, LiveConfigError> {
        let ops = validate_patch_document(&proposal.patch)?;
        let source = proposal
            .source
            .unwrap_or_else(|| PatchSource::new("system", "runtime"));
        if !SOURCE_TYPES.contains(&source.kind.as_str()) {
            return Err(LiveConfigError::InvalidProposal(format!(
                "source.type must be one of {}, got {:?}",
                SOURCE_TYPES.join(", "),
                source.kind
            )));
        }

        let scope = proposal.scope.unwrap_or(PatchScope::Agent);
        let target = proposal.target.unwrap_or_else(|| match scope {
            PatchScope::Agent => ObjectRef::new("Agent", agent_name),
            PatchScope::Swarm => ObjectRef::new("Swarm", self.options.swarm_name.as_str()),
        });
        let apply_at = proposal
            .apply_at
            .unwrap_or_else(|| DEFAULT_APPLY_POINT.to_string());

        let mut state = self.state.lock().await;
        let ManagerState {
            swarm,
            agents,
            counters,
        } = &mut *state;
        let agent = agents
            .get(agent_name)
            .ok_or_else(|| LiveConfigError::UnknownAgent(agent_name.to_string()))?;
        let store = match scope {
            PatchScope::Agent => &agent.store,
            PatchScope::Swarm => &swarm.store,
        };

        let name = next_patch_name(counters, store).await?;
        let patch = LivePatch {
            name: name.clone(),
            spec: Some(LivePatchSpec {
                scope,
                target,
                apply_at: apply_at.clone(),
                patch: PatchDocument {
                    kind: JSON6902.to_string(),
                    ops,
                },
                source,
                reason: proposal.reason.unwrap_or_default(),
                recorded_at: Utc::now(),
            }),
        };
        store.append_patch(&patch).await?;

        let status = LivePatchStatus {
            patch_name: name.clone(),
            agent_name: agent_name.to_string(),
            result: PatchResult::Pending,
            evaluated_at: Utc::now(),
            applied_at: None,
            effective_revision: None,
            applied_in_step_id: None,
            reason: Some("proposed".into()),
        };
        append_jsonl(&agent.store.status_path(), &status).await?;

        info!(agent = agent_name, patch = %name, scope = %scope, apply_at = %apply_at, "Live patch proposed");
        self.emit(
            LIVE_CONFIG_PATCH_PROPOSED,
            serde_json::json!({
                "patchName": name,
                "scope": scope,
                "agentName": agent_name,
                "applyAt": apply_at,
            }),
        );
        Ok(patch)
    }

    /// Evaluate every new swarm then agent patch and return the effective config.
    pub async fn apply_at_safe_point(
        &self,
        agent_name: &str,
        step_id: &str,
    ) -> Result<EffectiveConfig, LiveConfigError> {
        let mut state = self.state.lock().await;
        let ManagerState { swarm, agents, .. } = &mut *state;
        let agent = agents
            .get_mut(agent_name)
            .ok_or_else(|| LiveConfigError::UnknownAgent(agent_name.to_string()))?;

        if !self.policy.enabled {
            return Ok(effective_of(swarm, agent));
        }

        let starting_revision = agent.revision;
        let swarm_applied_before = swarm.applied.len();
        for scope in [PatchScope::Swarm, PatchScope::Agent] {
            self.process_log(scope, agent_name, agent, swarm, step_id).await?;
        }

        if self.options.write_snapshots && agent.revision != starting_revision {
            let effective = effective_of(swarm, agent);
            write_json(
                &agent.store.overlay_path(),
                &AgentSnapshot {
                    revision: agent.revision,
                    agent: agent.overlay.clone(),
                },
            )
            .await?;
            write_json(&agent.store.effective_path(agent.revision), &effective).await?;
        }
        if self.options.write_snapshots && swarm.applied.len() != swarm_applied_before {
            let mut applied: Vec<String> = swarm.applied.iter().cloned().collect();
            applied.sort();
            write_json(
                &swarm.store.overlay_path(),
                &SwarmSnapshot {
                    swarm: swarm.overlay.clone(),
                    applied_patches: applied,
                },
            )
            .await?;
        }
        write_json(&agent.store.cursor_path(), &agent.cursor).await?;

        Ok(effective_of(swarm, agent))
    }

    async fn process_log(
        &self,
        scope: PatchScope,
        agent_name: &str,
        agent: &mut AgentState,
        swarm: &mut SwarmState,
        step_id: &str,
    ) -> Result<(), LiveConfigError> {
        let patches = match scope {
            PatchScope::Swarm => swarm.store.read_patches().await?,
            PatchScope::Agent => agent.store.read_patches().await?,
        };
        let last_evaluated = match scope {
            PatchScope::Swarm => agent.cursor.swarm_patch_log.last_evaluated_patch_name.clone(),
            PatchScope::Agent => agent.cursor.patch_log.last_evaluated_patch_name.clone(),
        };
        let start = last_evaluated
            .and_then(|name| patches.iter().position(|p| p.name == name))
            .map_or(0, |i| i + 1);

        for patch in &patches[start..] {
            let status = self.evaluate(patch, scope, agent_name, agent, swarm, step_id);
            debug!(
                agent = agent_name,
                patch = %patch.name,
                result = ?status.result,
                reason = status.reason.as_deref().unwrap_or(""),
                "Live patch evaluated"
            );

            let log_cursor = match scope {
                PatchScope::Swarm => &mut agent.cursor.swarm_patch_log,
                PatchScope::Agent => &mut agent.cursor.patch_log,
            };
            log_cursor.last_evaluated_patch_name = Some(patch.name.clone());
            if status.result == PatchResult::Applied {
                log_cursor.last_applied_patch_name = Some(patch.name.clone());
                agent.cursor.effective.revision = agent.revision;
                agent.cursor.effective.last_applied_at = status.applied_at;
            }
            append_jsonl(&agent.store.status_path(), &status).await?;
        }
        Ok(())
    }

    fn evaluate(
        &self,
        patch: &LivePatch,
        scope: PatchScope,
        agent_name: &str,
        agent: &mut AgentState,
        swarm: &mut SwarmState,
        step_id: &str,
    ) -> LivePatchStatus {
        let now = Utc::now();
        let mut status = LivePatchStatus {
            patch_name: patch.name.clone(),
            agent_name: agent_name.to_string(),
            result: PatchResult::Pending,
            evaluated_at: now,
            applied_at: None,
            effective_revision: None,
            applied_in_step_id: None,
            reason: None,
        };
        let mut finish = |result: PatchResult, reason: String| {
            status.result = result;
            status.reason = Some(reason);
            status.clone()
        };

        let Some(spec) = &patch.spec else {
            return finish(PatchResult::Failed, "invalidPatch".into());
        };
        if spec.scope != scope {
            return finish(PatchResult::Pending, "scopeMismatch".into());
        }
        if !self.policy.allows_apply_at(&spec.apply_at) {
            return finish(PatchResult::Rejected, "applyAtNotAllowed".into());
        }
        let expected_target = match scope {
            PatchScope::Agent => agent_name,
            PatchScope::Swarm => self.options.swarm_name.as_str(),
        };
        if spec.target.name != expected_target {
            return finish(PatchResult::Pending, "targetNotFound".into());
        }
        if scope == PatchScope::Swarm && swarm.applied.contains(&patch.name) {
            let mut status = finish(PatchResult::Applied, "alreadyApplied".into());
            status.effective_revision = Some(agent.revision);
            status.applied_in_step_id = Some(step_id.to_string());
            return status;
        }
        if !is_patch_allowed(&self.policy, scope, &spec.patch.ops, &agent.base) {
            return finish(PatchResult::Rejected, "pathNotAllowed".into());
        }

        let document = match scope {
            PatchScope::Swarm => &mut swarm.overlay,
            PatchScope::Agent => &mut agent.overlay,
        };
        if let Err(e) = apply_patch(document, &spec.patch.ops) {
            warn!(agent = agent_name, patch = %patch.name, error = %e, "Live patch failed to apply");
            return finish(PatchResult::Failed, format!("applyError: {e}"));
        }

        agent.revision += 1;
        if scope == PatchScope::Swarm {
            swarm.applied.insert(patch.name.clone());
        }
        info!(
            agent = agent_name,
            patch = %patch.name,
            scope = %scope,
            revision = agent.revision,
            "Live patch applied"
        );
        if self.policy.emit_config_changed_event {
            self.emit(
                LIVE_CONFIG_CHANGED,
                serde_json::json!({
                    "patchName": patch.name,
                    "scope": scope,
                    "agentName": agent_name,
                    "revision": agent.revision,
                    "stepId": step_id,
                }),
            );
        }

        let mut status = finish(PatchResult::Applied, "ok".into());
        status.applied_at = Some(now);
        status.effective_revision = Some(agent.revision);
        status.applied_in_step_id = Some(step_id.to_string());
        status
    }

    /// Current effective configuration of an agent.
    pub async fn effective_config(&self, agent_name: &str) -> Option<EffectiveConfig> {
        let state = self.state.lock().await;
        let agent = state.agents.get(agent_name)?;
        Some(effective_of(&state.swarm, agent))
    }

    /// Status records written for an agent, oldest first.
    pub async fn statuses(&self, agent_name: &str) -> Result<Vec<LivePatchStatus>, LiveConfigError> {
        let path = ScopeStore::agent(&self.options.state_dir, &self.options.instance_id, agent_name)
            .status_path();
        read_jsonl(&path).await
    }

    /// A proposal port bound to one agent.
    pub fn port(self: &Arc<Self>, agent_name: &str) -> Arc<dyn LiveConfigPort> {
        Arc::new(AgentLiveConfig {
            manager: Arc::clone(self),
            agent_name: agent_name.to_string(),
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.options.state_dir
    }
}

fn effective_of(swarm: &SwarmState, agent: &AgentState) -> EffectiveConfig {
    EffectiveConfig {
        swarm: swarm.overlay.clone(),
        agent: agent.overlay.clone(),
        revision: agent.revision,
    }
}

fn validate_patch_document(patch: &serde_json::Value) -> Result<Vec<PatchOp>, LiveConfigError> {
    if patch.get("type").and_then(|t| t.as_str()) != Some(JSON6902) {
        return Err(LiveConfigError::InvalidProposal(format!(
            "patch.type must be {JSON6902:?}"
        )));
    }
    let Some(ops) = patch.get("ops").filter(|o| o.is_array()) else {
        return Err(LiveConfigError::InvalidProposal(
            "patch.ops must be a list".into(),
        ));
    };
    serde_json::from_value(ops.clone())
        .map_err(|e| LiveConfigError::InvalidProposal(format!("invalid patch op: {e}")))
}

async fn next_patch_name(
    counters: &mut HashMap<PathBuf, u64>,
    store: &ScopeStore,
) -> Result<String, LiveConfigError> {
    let key = store.patches_path();
    let last = match counters.get(&key) {
        Some(n) => *n,
        None => store
            .read_patches()
            .await?
            .last()
            .and_then(|p| p.name.strip_prefix("p-"))
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0),
    };
    let next = last + 1;
    counters.insert(key, next);
    Ok(format!("p-{next:06}"))
}

fn path_allowed(path: &str, allowed: Option<&[String]>) -> bool {
    match allowed {
        None => true,
        Some([]) => true,
        Some(list) => list
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{prefix}/"))),
    }
}

/// Whether every pointer touched by `ops` is inside the allowed prefixes.
///
/// Swarm patches are checked against the swarm-absolute list. Agent patches
/// must pass both the policy's agent-relative list and the list the agent
/// document declares. A missing or empty list allows everything.
pub fn is_patch_allowed(
    policy: &LiveConfigPolicy,
    scope: PatchScope,
    ops: &[PatchOp],
    agent_document: &serde_json::Value,
) -> bool {
    if !policy.enabled {
        return false;
    }
    let (policy_list, declared) = match scope {
        PatchScope::Swarm => (policy.allowed_paths.swarm_absolute.as_deref(), None),
        PatchScope::Agent => (
            policy.allowed_paths.agent_relative.as_deref(),
            agent_allowed_paths(agent_document),
        ),
    };
    ops.iter().flat_map(PatchOp::touched_paths).all(|path| {
        path_allowed(path, policy_list)
            && (scope == PatchScope::Swarm || path_allowed(path, declared.as_deref()))
    })
}

/// [`LiveConfigPort`] implementation scoped to one agent.
pub struct AgentLiveConfig {
    manager: Arc<LiveConfigManager>,
    agent_name: String,
}

#[async_trait]
impl LiveConfigPort for AgentLiveConfig {
    async fn propose_patch(&self, proposal: PatchProposal) -> Result<LivePatch, LiveConfigError> {
        self.manager.propose_patch(proposal, &self.agent_name).await
    }
}
