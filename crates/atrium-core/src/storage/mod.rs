//! Persistence collaborators of the plugin manager.

pub mod error;
pub mod settings;

pub use error::StorageError;
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
