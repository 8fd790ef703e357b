//! Agent instances: one FIFO queue and one pump task per agent.
//!
//! The pump owns the [`TurnRunner`] and drains the queue serially, so turns
//! of one instance never interleave. Pausing is checked when a turn is
//! dequeued; a turn already running finishes normally.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use swarmloop_core::{Error, InboundEvent, Result, Turn};
use swarmloop_pipeline::PipelinePoint;

use crate::runner::TurnRunner;

enum Command {
    Turn {
        event: InboundEvent,
        reply: Option<oneshot::Sender<Turn>>,
    },
    Workspace {
        point: PipelinePoint,
        payload: Value,
        reply: oneshot::Sender<Result<Option<Value>>>,
    },
}

#[derive(Debug, Default)]
struct Counters {
    paused: AtomicBool,
    queued: AtomicUsize,
    completed: AtomicU64,
}

/// Point-in-time view of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub agent: String,
    pub paused: bool,
    pub queued: usize,
    pub completed_turns: u64,
}

/// Cheap, cloneable handle to a running agent instance.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Command>,
    counters: Arc<Counters>,
}

pub struct AgentInstance;

impl AgentInstance {
    /// Prepare `runner` and spawn its pump.
    pub async fn start(mut runner: TurnRunner) -> Result<AgentHandle> {
        runner.prepare().await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let handle = AgentHandle {
            name: Arc::from(runner.agent_name()),
            sender,
            counters: Arc::clone(&counters),
        };

        info!(agent = %handle.name, "Agent instance started");
        tokio::spawn(pump(runner, receiver, counters));
        Ok(handle)
    }
}

async fn pump(mut runner: TurnRunner, mut receiver: mpsc::UnboundedReceiver<Command>, counters: Arc<Counters>) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Turn { event, reply } => {
                counters.queued.fetch_sub(1, Ordering::SeqCst);
                let active = !counters.paused.load(Ordering::SeqCst);
                let turn = runner.run(event, active).await;
                counters.completed.fetch_add(1, Ordering::SeqCst);
                if let Some(reply) = reply {
                    // The submitter may have stopped waiting.
                    let _ = reply.send(turn);
                }
            }
            Command::Workspace { point, payload, reply } => {
                let outcome = runner.notify_workspace(point, payload).await;
                let _ = reply.send(outcome);
            }
        }
    }
    debug!(agent = %runner.agent_name(), "Agent instance queue closed");
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, command: Command) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| Error::Internal(format!("agent instance {} has stopped", self.name)))
    }

    fn push_turn(&self, event: InboundEvent, reply: Option<oneshot::Sender<Turn>>) -> Result<()> {
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        self.send(Command::Turn { event, reply }).inspect_err(|_| {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
        })
    }

    /// Queue `event` and wait for its turn to finish.
    pub async fn submit(&self, event: InboundEvent) -> Result<Turn> {
        let (tx, rx) = oneshot::channel();
        self.push_turn(event, Some(tx))?;
        rx.await
            .map_err(|_| Error::Internal(format!("agent instance {} dropped the turn", self.name)))
    }

    /// Queue `event` without waiting.
    pub fn enqueue(&self, event: InboundEvent) -> Result<()> {
        self.push_turn(event, None)
    }

    /// Turns dequeued from now on are interrupted.
    pub fn pause(&self) {
        if !self.counters.paused.swap(true, Ordering::SeqCst) {
            info!(agent = %self.name, "Agent instance paused");
        }
    }

    pub fn resume(&self) {
        if self.counters.paused.swap(false, Ordering::SeqCst) {
            info!(agent = %self.name, "Agent instance resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.counters.paused.load(Ordering::SeqCst)
    }

    pub fn completed_turns(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            agent: self.name.to_string(),
            paused: self.is_paused(),
            queued: self.counters.queued.load(Ordering::SeqCst),
            completed_turns: self.completed_turns(),
        }
    }

    /// Run a workspace lifecycle point on this instance's pump, between turns.
    pub async fn notify_workspace(&self, point: PipelinePoint, payload: Value) -> Result<Option<Value>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Workspace {
            point,
            payload,
            reply: tx,
        })?;
        rx.await.unwrap_or_else(|_| {
            warn!(agent = %self.name, point = %point, "Agent instance stopped before workspace point ran");
            Err(Error::Internal(format!("agent instance {} has stopped", self.name)))
        })
    }
}
