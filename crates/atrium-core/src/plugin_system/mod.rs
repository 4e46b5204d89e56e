//! # Atrium plugin system
//!
//! Infrastructure for extending the Atrium shell through dynamically
//! loaded plugins: descriptor parsing, dependency resolution with cycle
//! detection, transitive disablement propagation, topologically ordered
//! load/initialize/unload, and the external contracts a plugin module
//! and its host implement.
//!
//! ## Submodules
//!
//! - [`version`]: the dotted version grammar used by descriptors
//!   (informational only).
//! - [`dependency`]: a declared, optionally versioned requirement on
//!   another plugin.
//! - [`descriptor`]: [`PluginDescriptor`] — per-plugin metadata,
//!   lifecycle state machine, graph edges and error accumulation.
//! - [`registry`]: [`PluginRegistry`] — the descriptor arena and every
//!   algorithm that traverses the dependency graph.
//! - [`manager`]: [`PluginManager`] — orchestration of the full
//!   discover/resolve/load/initialize/unload cycle.
//! - [`loader`]: the code-module loading collaborator.
//! - [`traits`]: the [`Plugin`] capability interface and the host
//!   notification contract.
//! - [`error`]: plugin system error types.

pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod traits;
pub mod version;

pub use dependency::PluginDependency;
pub use descriptor::{PluginDescriptor, PluginState};
pub use error::PluginSystemError;
pub use loader::{DynamicModuleLoader, ModuleLoader, PluginHandle, StaticModuleLoader};
pub use manager::PluginManager;
pub use registry::{DescriptorId, PluginRegistry};
pub use traits::{InitializationObserver, NullObserver, Plugin};

#[cfg(test)]
mod tests;
