pub mod config_cmd;
pub mod patch;
pub mod run;

use anyhow::Context;
use clap::Args;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use swarmloop_config::AppConfig;
use swarmloop_live_config::{LiveConfigManager, LiveConfigOptions};

/// Which swarm instance and agent a command works on.
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Agent name
    #[arg(short, long, default_value = "assistant")]
    pub agent: String,

    /// Swarm name
    #[arg(long, default_value = "default")]
    pub swarm: String,

    /// Instance id; reuse it to continue live-config state across runs
    #[arg(long, default_value = "local")]
    pub instance: String,

    /// JSON file holding the swarm document
    #[arg(long)]
    pub swarm_file: Option<PathBuf>,

    /// JSON file holding the agent document
    #[arg(long)]
    pub agent_file: Option<PathBuf>,
}

pub struct Documents {
    pub swarm: Value,
    pub agent: Value,
}

impl StateArgs {
    pub fn documents(&self) -> anyhow::Result<Documents> {
        let swarm = match &self.swarm_file {
            Some(path) => read_document(path)?,
            None => json!({}),
        };
        let agent = match &self.agent_file {
            Some(path) => read_document(path)?,
            None => default_agent(),
        };
        Ok(Documents { swarm, agent })
    }

    /// A live-config manager over the instance's state directory.
    pub fn live_config(&self, config: &AppConfig, swarm: Value) -> Arc<LiveConfigManager> {
        Arc::new(LiveConfigManager::new(LiveConfigOptions {
            instance_id: self.instance.clone(),
            swarm_name: self.swarm.clone(),
            swarm_config: swarm,
            state_dir: config.runtime.state_path(),
            write_snapshots: config.live_config.write_snapshots,
        }))
    }
}

fn default_agent() -> Value {
    json!({
        "prompts": {"system": "You are a helpful assistant."},
        "modelConfig": {"modelRef": "echo", "params": {}},
    })
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}
