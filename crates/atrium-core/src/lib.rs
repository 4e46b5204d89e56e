pub mod plugin_system;
pub mod storage;

// Re-export the types most hosts need directly.
pub use plugin_system::{
    InitializationObserver, Plugin, PluginDescriptor, PluginManager, PluginRegistry, PluginState,
};
pub use storage::{JsonSettingsStore, SettingsStore};
