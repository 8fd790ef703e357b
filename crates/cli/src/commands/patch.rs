//! `swarmloop patch`: propose live-config patches and read their statuses.

use anyhow::{Context, bail};
use clap::{Args, Subcommand, ValueEnum};

use swarmloop_config::AppConfig;
use swarmloop_core::{LivePatch, PatchOp, PatchOpKind, PatchProposal, PatchScope, PatchSource};

use super::StateArgs;

#[derive(Subcommand, Debug)]
pub enum PatchCommand {
    /// Append a single-op patch proposal to the instance's state directory
    Propose(ProposeArgs),

    /// Print the patch status log of an agent
    Status {
        #[command(flatten)]
        state: StateArgs,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ScopeArg {
    Agent,
    Swarm,
}

impl From<ScopeArg> for PatchScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Agent => PatchScope::Agent,
            ScopeArg::Swarm => PatchScope::Swarm,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OpArg {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

impl From<OpArg> for PatchOpKind {
    fn from(op: OpArg) -> Self {
        match op {
            OpArg::Add => PatchOpKind::Add,
            OpArg::Remove => PatchOpKind::Remove,
            OpArg::Replace => PatchOpKind::Replace,
            OpArg::Move => PatchOpKind::Move,
            OpArg::Copy => PatchOpKind::Copy,
            OpArg::Test => PatchOpKind::Test,
        }
    }
}

#[derive(Args, Debug)]
pub struct ProposeArgs {
    #[arg(long, value_enum, default_value_t = ScopeArg::Agent)]
    pub scope: ScopeArg,

    #[arg(long, value_enum)]
    pub op: OpArg,

    /// JSON pointer the op writes
    #[arg(long)]
    pub path: String,

    /// Source pointer for move and copy
    #[arg(long)]
    pub from: Option<String>,

    /// JSON value for add, replace and test
    #[arg(long)]
    pub value: Option<String>,

    /// Safe point the patch applies at (defaults to step.config)
    #[arg(long)]
    pub apply_at: Option<String>,

    #[arg(long)]
    pub reason: Option<String>,

    #[command(flatten)]
    pub state: StateArgs,
}

impl ProposeArgs {
    fn op(&self) -> anyhow::Result<PatchOp> {
        let value = match &self.value {
            Some(raw) => Some(
                serde_json::from_str(raw)
                    .with_context(|| format!("--value is not valid JSON: {raw}"))?,
            ),
            None => None,
        };
        match self.op {
            OpArg::Add | OpArg::Replace | OpArg::Test if value.is_none() => {
                bail!("--value is required for {:?}", self.op)
            }
            OpArg::Move | OpArg::Copy if self.from.is_none() => {
                bail!("--from is required for {:?}", self.op)
            }
            _ => {}
        }
        Ok(PatchOp {
            op: self.op.into(),
            path: self.path.clone(),
            from: self.from.clone(),
            value,
        })
    }
}

pub async fn run(config: AppConfig, command: PatchCommand) -> anyhow::Result<()> {
    match command {
        PatchCommand::Propose(args) => {
            let patch = propose(&config, &args).await?;
            println!(
                "Proposed {} ({} scope) for agent {}",
                patch.name,
                PatchScope::from(args.scope),
                args.state.agent
            );
        }
        PatchCommand::Status { state } => {
            let docs = state.documents()?;
            let statuses = state
                .live_config(&config, docs.swarm)
                .statuses(&state.agent)
                .await?;
            if statuses.is_empty() {
                println!("No patch statuses for agent {}", state.agent);
            }
            for status in statuses {
                println!("{}", serde_json::to_string(&status)?);
            }
        }
    }
    Ok(())
}

pub async fn propose(config: &AppConfig, args: &ProposeArgs) -> anyhow::Result<LivePatch> {
    let op = args.op()?;
    let docs = args.state.documents()?;
    let manager = args.state.live_config(config, docs.swarm);
    manager
        .init_agent(&args.state.agent, docs.agent)
        .await
        .context("Failed to open live-config state")?;

    let mut proposal = PatchProposal::json6902(vec![op])
        .scope(args.scope.into())
        .source(PatchSource::new("sidecar", "swarmloop-cli"));
    if let Some(point) = &args.apply_at {
        proposal = proposal.apply_at(point);
    }
    if let Some(reason) = &args.reason {
        proposal = proposal.reason(reason);
    }
    Ok(manager.propose_patch(proposal, &args.state.agent).await?)
}
