//! Policy values read from swarm and agent documents.

use serde::{Deserialize, Serialize};

/// Default safe points for patch application.
pub const DEFAULT_APPLY_AT: &[&str] = &["step.config"];

/// Path prefixes patches may touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedPaths {
    /// For swarm-scoped patches, absolute pointers into the swarm document.
    #[serde(default)]
    pub swarm_absolute: Option<Vec<String>>,
    /// For agent-scoped patches, pointers into the agent document.
    #[serde(default)]
    pub agent_relative: Option<Vec<String>>,
}

/// `/policy/liveConfig` of the swarm document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveConfigPolicy {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_apply_at")]
    pub apply_at: Vec<String>,

    #[serde(default)]
    pub allowed_paths: AllowedPaths,

    #[serde(default)]
    pub emit_config_changed_event: bool,
}

fn default_apply_at() -> Vec<String> {
    DEFAULT_APPLY_AT.iter().map(|s| s.to_string()).collect()
}

impl Default for LiveConfigPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            apply_at: default_apply_at(),
            allowed_paths: AllowedPaths::default(),
            emit_config_changed_event: false,
        }
    }
}

impl LiveConfigPolicy {
    /// Parse the policy from a swarm document. Missing or malformed policy
    /// reads as disabled.
    pub fn from_swarm(swarm: &serde_json::Value) -> Self {
        match swarm.pointer("/policy/liveConfig") {
            Some(raw) => serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring malformed live config policy");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn allows_apply_at(&self, point: &str) -> bool {
        self.apply_at.iter().any(|p| p == point)
    }
}

/// `/liveConfig/allowedPaths/agentRelative` of an agent document.
pub fn agent_allowed_paths(agent: &serde_json::Value) -> Option<Vec<String>> {
    agent
        .pointer("/liveConfig/allowedPaths/agentRelative")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// A positive `/policy/maxStepsPerTurn` from a swarm document.
pub fn swarm_max_steps(swarm: &serde_json::Value) -> Option<u32> {
    let raw = swarm.pointer("/policy/maxStepsPerTurn")?;
    let n = raw
        .as_u64()
        .or_else(|| raw.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f.floor() as u64))?;
    u32::try_from(n).ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_policy_is_disabled() {
        let policy = LiveConfigPolicy::from_swarm(&json!({"policy": {}}));
        assert!(!policy.enabled);
        assert_eq!(policy.apply_at, vec!["step.config"]);
    }

    #[test]
    fn parses_camel_case_policy() {
        let policy = LiveConfigPolicy::from_swarm(&json!({
            "policy": {"liveConfig": {
                "enabled": true,
                "applyAt": ["step.config", "step.pre"],
                "allowedPaths": {"swarmAbsolute": ["/policy"]},
                "emitConfigChangedEvent": true
            }}
        }));
        assert!(policy.enabled);
        assert!(policy.allows_apply_at("step.pre"));
        assert!(!policy.allows_apply_at("turn.post"));
        assert_eq!(
            policy.allowed_paths.swarm_absolute,
            Some(vec!["/policy".to_string()])
        );
        assert!(policy.allowed_paths.agent_relative.is_none());
        assert!(policy.emit_config_changed_event);
    }

    #[test]
    fn reads_agent_declared_paths() {
        let agent = json!({"liveConfig": {"allowedPaths": {"agentRelative": ["/modelConfig"]}}});
        assert_eq!(agent_allowed_paths(&agent), Some(vec!["/modelConfig".to_string()]));
        assert_eq!(agent_allowed_paths(&json!({})), None);
    }

    #[test]
    fn max_steps_must_be_positive() {
        assert_eq!(swarm_max_steps(&json!({"policy": {"maxStepsPerTurn": 3}})), Some(3));
        assert_eq!(swarm_max_steps(&json!({"policy": {"maxStepsPerTurn": 2.7}})), Some(2));
        assert_eq!(swarm_max_steps(&json!({"policy": {"maxStepsPerTurn": 0}})), None);
        assert_eq!(swarm_max_steps(&json!({"policy": {"maxStepsPerTurn": "x"}})), None);
        assert_eq!(swarm_max_steps(&json!({})), None);
    }
}
