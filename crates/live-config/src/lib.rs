//! # Swarmloop Live Config
//!
//! Lets tools, extensions and external systems propose configuration
//! deltas without touching running state. Proposals land in append-only
//! JSON-lines logs; they are evaluated and applied only at safe points, and
//! only within the paths the swarm policy allows.

pub mod lock;
pub mod manager;
pub mod patch;
pub mod store;

pub use lock::{LockState, PidFileLock, ScopeLock};
pub use manager::{AgentLiveConfig, LiveConfigManager, LiveConfigOptions, is_patch_allowed};
pub use patch::{PatchError, apply_patch};
pub use store::{Cursor, ScopeStore};
