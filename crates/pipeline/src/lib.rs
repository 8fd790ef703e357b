//! # Swarmloop Pipeline
//!
//! Generic named-point interception used by the turn loop, the tool
//! executor and every extension.

pub mod guard;
pub mod manager;
pub mod point;

pub use guard::accept_changes;
pub use manager::{Next, PipelineManager};
pub use point::PipelinePoint;
