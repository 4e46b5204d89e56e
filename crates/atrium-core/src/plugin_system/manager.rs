//! Plugin manager: discovery, resolution and the bulk
//! load/initialize/unload cycle across the whole descriptor set.
//!
//! The manager is an explicitly constructed object owned by the host's
//! composition root (no hidden singleton). It owns the registry, an
//! injected [`ModuleLoader`] and an injected [`SettingsStore`], and
//! drives the sequence: discover descriptor files, parse, resolve
//! dependencies, propagate indirect disablement, load modules in
//! dependency order, initialize in the same order, and unload in the
//! reverse-compatible order.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::PathBuf;

use log::{debug, warn};

use crate::plugin_system::descriptor::{PluginDescriptor, PluginState};
use crate::plugin_system::loader::ModuleLoader;
use crate::plugin_system::registry::{DescriptorId, PluginRegistry};
use crate::plugin_system::traits::InitializationObserver;
use crate::storage::SettingsStore;

/// File extension of plugin descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = "spec";

/// Orchestrates the plugin lifecycle across the whole registry.
pub struct PluginManager {
    registry: PluginRegistry,
    loader: Box<dyn ModuleLoader>,
    settings: Box<dyn SettingsStore>,
    disabled_names: BTreeSet<String>,
    persistent_names: BTreeSet<String>,
    shutdown_plugin: Option<String>,
}

impl PluginManager {
    /// Creates a manager with the given collaborators and restores the
    /// persisted disabled-plugin names.
    pub fn new(loader: Box<dyn ModuleLoader>, settings: Box<dyn SettingsStore>) -> Self {
        let disabled_names = match settings.disabled_plugins() {
            Ok(names) => names,
            Err(err) => {
                warn!("Could not restore plugin settings: {}", err);
                BTreeSet::new()
            }
        };
        debug!("PluginManager: settings restored");
        Self {
            registry: PluginRegistry::new(),
            loader,
            settings,
            disabled_names,
            persistent_names: BTreeSet::new(),
            shutdown_plugin: None,
        }
    }

    /// Marks a plugin as persistent: it stays enabled even when a
    /// persisted disabled entry names it, and cannot be disabled later.
    /// Hosts call this for plugins they cannot run without, before
    /// scanning.
    pub fn mark_persistent(&mut self, name: &str) {
        self.persistent_names.insert(name.to_string());
        if let Some(id) = self.registry.find_by_name(name) {
            self.registry.descriptor_mut(id).set_persistent(true);
            self.registry.resolve_indirectly_disabled(id, true);
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    /// Searches `paths` recursively for descriptor files and resolves
    /// the dependencies among the discovered plugins, without loading
    /// any code module. Parse failures and duplicate names exclude the
    /// descriptor from the registry.
    pub fn scan_plugins(&mut self, paths: &[PathBuf]) {
        debug_assert!(!paths.is_empty());
        debug_assert!(self.registry.is_empty());

        self.read_descriptors(paths);
        self.resolve_descriptors();
    }

    /// Scans `paths` and loads the code modules of all wanted plugins in
    /// dependency order.
    ///
    /// Load failures are recorded on the descriptor and do not stop the
    /// batch.
    pub fn load_plugins(&mut self, paths: &[PathBuf]) {
        self.scan_plugins(paths);

        let queue = self.registry.load_queue();
        for id in queue {
            self.registry.load_plugin(id, self.loader.as_ref());
        }
    }

    /// Tries to initialize every loaded plugin, in load-queue order.
    ///
    /// The observer is fed the current plugin name before each attempt
    /// and receives `plugins_initialized` after the pass completes. A
    /// non-fatal failure unloads the failing plugin's dependent subgraph
    /// and re-propagates indirect disablement; a plugin that requests
    /// shutdown aborts the whole pass.
    ///
    /// Returns true when every queued plugin initialized successfully.
    pub fn initialize_plugins(&mut self, observer: &mut dyn InitializationObserver) -> bool {
        let queue = self.registry.load_queue();
        let mut all_initialized = true;
        self.shutdown_plugin = None;

        for id in queue {
            if self.registry.descriptor(id).state() != PluginState::Loaded {
                continue;
            }
            observer.status(self.registry.descriptor(id).name());
            if self.registry.initialize_plugin(id) {
                continue;
            }
            all_initialized = false;

            if self.registry.plugin_shutdown_requested(id) {
                // Fatal: the host must terminate instead of degrading.
                self.shutdown_plugin = Some(self.registry.descriptor(id).name().to_string());
                return false;
            }

            let mut unload = Vec::new();
            let mut visiting = Vec::new();
            self.registry.unload_queue_into(id, &mut unload, &mut visiting);
            self.unload(&unload);
            self.registry.resolve_indirectly_disabled(id, true);
        }

        observer.plugins_initialized();
        all_initialized
    }

    /// Name of the plugin that requested application shutdown during the
    /// last initialize pass, if any.
    pub fn shutdown_requested(&self) -> Option<&str> {
        self.shutdown_plugin.as_deref()
    }

    /// Unloads all loaded plugins, dependents before dependencies.
    /// Initialized plugins are shut down before their module is
    /// released.
    pub fn unload_plugins(&mut self) {
        let queue = self.registry.unload_queue();
        self.unload(&queue);
    }

    /// Enables or disables a plugin by name and records the choice for
    /// persistence. Persistent plugins cannot be disabled.
    pub fn set_plugin_enabled(&mut self, name: &str, enabled: bool) {
        if let Some(id) = self.registry.find_by_name(name) {
            self.registry.descriptor_mut(id).set_enabled(enabled);
            if self.registry.descriptor(id).is_enabled() {
                self.disabled_names.remove(name);
            } else {
                self.disabled_names.insert(name.to_string());
            }
        } else if enabled {
            self.disabled_names.remove(name);
        } else {
            self.disabled_names.insert(name.to_string());
        }
    }

    /// Writes the current disabled-plugin name set to the settings
    /// store. Also called on drop.
    pub fn save_settings(&mut self) {
        let mut disabled = self.disabled_names.clone();
        for (_, descriptor) in self.registry.iter() {
            if descriptor.is_enabled() {
                disabled.remove(descriptor.name());
            } else {
                disabled.insert(descriptor.name().to_string());
            }
        }
        if let Err(err) = self.settings.set_disabled_plugins(&disabled) {
            warn!("Could not save plugin settings: {}", err);
        } else {
            debug!("PluginManager: settings saved");
        }
        self.disabled_names = disabled;
    }

    fn unload(&mut self, queue: &[DescriptorId]) {
        for &id in queue {
            self.registry.unload_plugin(id);
        }
    }

    /// Recursively enumerates readable descriptor files under `paths`
    /// and parses each into a descriptor. Parse failures and duplicate
    /// names are logged and excluded.
    fn read_descriptors(&mut self, paths: &[PathBuf]) {
        let mut descriptor_files = Vec::new();
        let mut pending: VecDeque<PathBuf> = paths.iter().cloned().collect();

        while let Some(dir) = pending.pop_front() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("Cannot search '{}' for plugins: {}", dir.display(), err);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push_back(path);
                } else if path.extension().and_then(|ext| ext.to_str())
                    == Some(DESCRIPTOR_EXTENSION)
                {
                    descriptor_files.push(path);
                }
            }
        }

        // Registration order decides which duplicate wins; sort so the
        // outcome does not depend on directory iteration order.
        descriptor_files.sort();

        for file in descriptor_files {
            let mut descriptor = PluginDescriptor::new();
            match descriptor.read(&file) {
                Ok(()) => {
                    if let Err(err) = self.registry.register(descriptor) {
                        warn!("{}", err);
                    }
                }
                Err(err) => {
                    warn!("{}", err);
                }
            }
        }
    }

    /// Applies the persisted disabled names, resolves every descriptor's
    /// dependencies and force-propagates indirect disablement.
    fn resolve_descriptors(&mut self) {
        let ids = self.registry.ids_by_name();
        for &id in &ids {
            // Persistence wins over a persisted disabled entry.
            if self
                .persistent_names
                .contains(self.registry.descriptor(id).name())
            {
                self.registry.descriptor_mut(id).set_persistent(true);
            }
            if self
                .disabled_names
                .contains(self.registry.descriptor(id).name())
            {
                self.registry.descriptor_mut(id).set_enabled(false);
            }
            self.registry.resolve_dependencies(id);
        }
        for &id in &ids {
            self.registry.resolve_indirectly_disabled(id, true);
        }
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        self.save_settings();

        let leaked: Vec<&str> = self
            .registry
            .iter()
            .filter(|(_, descriptor)| descriptor.is_loaded())
            .map(|(_, descriptor)| descriptor.name())
            .collect();
        if !leaked.is_empty() {
            warn!("{} unloaded plugins left in memory:", leaked.len());
            for name in leaked {
                warn!("  - {}", name);
            }
        }
    }
}
