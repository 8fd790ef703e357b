//! Hierarchical execution tracing for Swarmloop turns.
//!
//! Every turn produces one [`Trace`]: a `turn` root span, a `step` span per
//! loop iteration, and `config_apply`, `llm_call` and `tool_call` spans under
//! their step. Spans are also echoed as `tracing` debug events.

pub mod model;
pub mod recorder;

pub use model::{Span, SpanKind, Trace};
pub use recorder::TraceRecorder;
