//! The Swarmloop turn engine.
//!
//! An agent instance receives inbound events on a FIFO queue and runs one
//! [`Turn`](swarmloop_core::Turn) per event:
//!
//! 1. **Dequeue** an event; a paused instance interrupts the turn right away
//! 2. Per step, **apply live config** at the safe point and **reconcile**
//!    extensions and remote tool servers against the effective agent document
//! 3. **Build** the tool catalog and the context blocks
//! 4. **Call** the language model (with one retry after `step.llmError`)
//! 5. **If tool calls**: execute them in order and loop back to step 2
//! 6. **If text**: it becomes the turn summary and the turn completes
//!
//! The loop ends early at `maxStepsPerTurn` with `stepLimitReached` set.

pub mod blocks;
pub mod instance;
pub mod runner;
pub mod runtime;

pub use blocks::{AUTH_PENDING_BLOCK, SYSTEM_BLOCK, default_blocks, model_request};
pub use instance::{AgentHandle, AgentInstance, AgentStatus};
pub use runner::{DEFAULT_MAX_STEPS_PER_TURN, INTERRUPT_PAUSED, RunnerParts, TurnRunner};
pub use runtime::{SwarmRuntime, SwarmRuntimeBuilder, auth_resume_event};
