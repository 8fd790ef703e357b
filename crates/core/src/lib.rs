//! # Swarmloop Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! Swarmloop turn engine. Everything that crosses a crate boundary lives
//! here so the engine crates depend inward only.
//!
//! ## Collaborators
//!
//! The engine consumes its surroundings through traits:
//! - [`LanguageModel`] for the model call of each step
//! - [`ConfigRegistry`] for resolving resource references
//! - [`TokenAccessor`] for OAuth tokens handed to tools
//! - [`ToolHandler`] for concrete tool implementations
//!
//! and exposes an [`EventPort`] and a [`LiveConfigPort`] back to them.

pub mod context;
pub mod error;
pub mod event;
pub mod live_patch;
pub mod llm;
pub mod oauth;
pub mod resource;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use context::StepContext;
pub use error::{Error, ExtensionError, LiveConfigError, LlmError, PipelineError, Result, ToolError};
pub use event::{EventPort, HandlerId, RuntimeEvent};
pub use live_patch::{
    EffectiveConfig, LiveConfigPort, LivePatch, LivePatchSpec, LivePatchStatus, PatchOp,
    PatchOpKind, PatchProposal, PatchResult, PatchScope, PatchSource,
};
pub use llm::{LanguageModel, LlmErrorInfo, LlmRequest, LlmResult};
pub use oauth::{ScopedTokens, TokenAccessor, TokenRequest, TokenResult, TokenScope};
pub use resource::{ConfigRegistry, InMemoryRegistry, ObjectRef, Resource};
pub use tool::{
    ToolCall, ToolCatalogItem, ToolContext, ToolHandler, ToolResult, ToolSource, ToolStatus,
    handler_fn,
};
pub use turn::{
    ContextBlock, ErrorInfo, InboundEvent, InstanceInfo, Step, Turn, TurnAuth, TurnMessage,
    TurnMetadata, TurnStatus,
};
