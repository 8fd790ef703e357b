//! `swarmloop run`: one turn against the echo model.

use anyhow::Context;
use clap::Args;
use std::sync::Arc;
use tracing::info;

use swarmloop_agent::SwarmRuntime;
use swarmloop_config::AppConfig;
use swarmloop_core::{InMemoryRegistry, InboundEvent, Turn};

use super::StateArgs;
use crate::echo::EchoModel;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The user message for the turn
    #[arg(short, long)]
    pub message: String,

    /// Override runtime.max_steps_per_turn
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Print the whole turn as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub state: StateArgs,
}

pub async fn run(config: AppConfig, args: RunArgs) -> anyhow::Result<()> {
    let turn = run_turn(config, &args).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&turn)?);
        return Ok(());
    }

    println!("status:  {}", turn.status);
    println!("steps:   {}", turn.steps.len());
    if turn.metadata.step_limit_reached {
        println!("         (step limit reached)");
    }
    if let Some(error) = &turn.metadata.error {
        println!("error:   {}: {}", error.name, error.message);
    }
    println!("summary: {}", turn.summary.as_deref().unwrap_or("-"));
    Ok(())
}

async fn run_turn(mut config: AppConfig, args: &RunArgs) -> anyhow::Result<Turn> {
    if let Some(n) = args.max_steps {
        config.runtime.max_steps_per_turn = n;
    }
    config.validate()?;

    let docs = args.state.documents()?;
    let runtime = SwarmRuntime::builder(&args.state.swarm, docs.swarm, Arc::new(InMemoryRegistry::new()))
        .config(config)
        .instance_id(&args.state.instance)
        .build();
    let agent = runtime
        .add_agent(&args.state.agent, docs.agent, Arc::new(EchoModel))
        .await
        .with_context(|| format!("Failed to start agent {}", args.state.agent))?;

    info!(agent = %args.state.agent, instance = %args.state.instance, "Running turn");
    let turn = agent.submit(InboundEvent::text(&args.message)).await?;
    Ok(turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::patch::{OpArg, ProposeArgs, ScopeArg, propose};
    use crate::commands::tests::state;
    use swarmloop_core::{PatchResult, TurnStatus};

    fn args(state: StateArgs, message: &str) -> RunArgs {
        RunArgs {
            message: message.into(),
            max_steps: None,
            json: false,
            state,
        }
    }

    #[tokio::test]
    async fn echo_turn_completes_in_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let (config, state) = state(dir.path());

        let turn = run_turn(config, &args(state, "hello")).await.unwrap();
        assert_eq!(turn.status, TurnStatus::Completed);
        assert_eq!(turn.steps.len(), 1);
        assert_eq!(turn.summary.as_deref(), Some("echo: hello"));
    }

    #[tokio::test]
    async fn zero_max_steps_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (config, state) = state(dir.path());
        let mut run = args(state, "hello");
        run.max_steps = Some(0);

        assert!(run_turn(config, &run).await.is_err());
    }

    #[tokio::test]
    async fn proposed_patch_applies_on_the_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let swarm = dir.path().join("swarm.json");
        std::fs::write(&swarm, r#"{"policy": {"liveConfig": {"enabled": true}}}"#).unwrap();
        let (config, mut state) = state(dir.path());
        state.swarm_file = Some(swarm);

        let patch = propose(
            &config,
            &ProposeArgs {
                scope: ScopeArg::Agent,
                op: OpArg::Replace,
                path: "/prompts/system".into(),
                from: None,
                value: Some(r#""Answer briefly.""#.into()),
                apply_at: None,
                reason: Some("shorter answers".into()),
                state: state.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(patch.name, "p-000001");

        let turn = run_turn(config.clone(), &args(state.clone(), "hi")).await.unwrap();
        assert_eq!(turn.status, TurnStatus::Completed);

        let statuses = state
            .live_config(&config, serde_json::json!({}))
            .statuses(&state.agent)
            .await
            .unwrap();
        let last = statuses.last().unwrap();
        assert_eq!(last.patch_name, "p-000001");
        assert_eq!(last.result, PatchResult::Applied);
        assert_eq!(last.effective_revision, Some(1));
    }
}
