//! # Swarmloop Extensions
//!
//! Extensions are modules that register pipeline interceptors and tools for
//! an agent. The [`ExtensionReconciler`] loads them through an injected
//! [`ModuleLoader`], hands each an [`ExtensionApi`] and swaps the resulting
//! pipeline in whenever the declared set changes.

pub mod api;
pub mod module;
pub mod reconciler;
pub mod state;

pub use api::ExtensionApi;
pub use module::{ExtensionModule, ModuleLoader, StaticModuleLoader, entry_key};
pub use reconciler::{ExtensionReconciler, resource_identity};
pub use state::{ExtensionState, ExtensionStateArena};
