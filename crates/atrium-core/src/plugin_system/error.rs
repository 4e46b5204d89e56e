//! Error types of the plugin system.
//!
//! [`PluginSystemError`] covers the failure taxonomy: descriptor parse
//! errors, dependency resolution failures, circular dependencies, module
//! load failures and plugin initialization failures. All of them are
//! recovered locally and surfaced as accumulated error strings on the
//! affected descriptor; only the fatal shutdown request (reported by
//! name through the manager) terminates the host.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("Failed to parse descriptor '{}': {message}", .path.display())]
    ParseError {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Plugin {plugin} - could not resolve dependency on {dependency}.")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("Plugin loading failed for '{plugin}' from '{}': {message}", .path.display())]
    LoadingError {
        plugin: String,
        path: PathBuf,
        message: String,
    },

    #[error("Initialization of '{plugin}' plugin failed: {message}")]
    InitializationError { plugin: String, message: String },

    #[error("Internal plugin system error: {0}")]
    InternalError(String),
}
