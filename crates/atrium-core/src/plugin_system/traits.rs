//! External contracts of the plugin system.
//!
//! [`Plugin`] is the capability interface every loadable module must
//! implement; [`InitializationObserver`] is the host-side sink the
//! manager feeds while driving a load/initialize pass.

/// Capability interface implemented by every loadable plugin module.
///
/// The manager calls `initialize` in dependency order (dependencies
/// before dependents) and `shutdown` in the reverse order (dependents
/// before dependencies).
pub trait Plugin {
    /// Allocates the plugin's resources.
    ///
    /// Returns a human-readable error message on failure. A failed
    /// initialization is not fatal to the host unless the plugin also
    /// answers true from [`Plugin::is_shutdown_requested`].
    fn initialize(&mut self) -> Result<(), String>;

    /// Releases the plugin's resources. Called before the module is
    /// unloaded, but only if `initialize` previously succeeded.
    fn shutdown(&mut self);

    /// Queried only after a failed `initialize`. Answering true signals
    /// that the whole application must terminate rather than degrade
    /// gracefully.
    fn is_shutdown_requested(&self) -> bool {
        false
    }
}

/// Host-side progress sink for long-running load/initialize passes.
pub trait InitializationObserver {
    /// Fed the name of the plugin currently being initialized.
    fn status(&mut self, plugin_name: &str);

    /// Raised once after a full initialize pass completes, regardless of
    /// partial non-fatal failures. Not raised when the pass is aborted
    /// by a shutdown request.
    fn plugins_initialized(&mut self);
}

/// Observer that discards all notifications.
pub struct NullObserver;

impl InitializationObserver for NullObserver {
    fn status(&mut self, _plugin_name: &str) {}

    fn plugins_initialized(&mut self) {}
}
