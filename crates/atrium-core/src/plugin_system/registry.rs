//! Descriptor arena and the dependency graph algorithms.
//!
//! [`PluginRegistry`] owns every [`PluginDescriptor`] of the active
//! discovery pass and runs the operations that need to follow graph
//! edges across descriptors: dependency resolution, indirect-disable
//! propagation, load/unload queue construction and the per-descriptor
//! load/initialize/unload lifecycle steps.
//!
//! Descriptors are addressed by [`DescriptorId`], a stable index into
//! the arena. Edges are stored as id lists on the descriptors; the
//! graph stays immutable between resolution passes.

use log::{debug, warn};

use crate::plugin_system::descriptor::{PluginDescriptor, PluginState};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::ModuleLoader;

/// Stable index of a descriptor within the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId(pub(crate) usize);

/// Owns all descriptors of the current discovery pass.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    descriptors: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly read descriptor.
    ///
    /// Names must be unique across the active set: a descriptor whose
    /// name is already registered is rejected, deterministically keeping
    /// whichever was registered first.
    pub fn register(
        &mut self,
        descriptor: PluginDescriptor,
    ) -> Result<DescriptorId, PluginSystemError> {
        if let Some(existing) = self.find_by_name(descriptor.name()) {
            let kept = &self.descriptors[existing.0];
            return Err(PluginSystemError::InternalError(format!(
                "duplicate plugin name '{}' in {} (already registered from {})",
                descriptor.name(),
                descriptor.file_name(),
                kept.file_name()
            )));
        }
        self.descriptors.push(descriptor);
        Ok(DescriptorId(self.descriptors.len() - 1))
    }

    pub fn descriptor(&self, id: DescriptorId) -> &PluginDescriptor {
        &self.descriptors[id.0]
    }

    pub fn descriptor_mut(&mut self, id: DescriptorId) -> &mut PluginDescriptor {
        &mut self.descriptors[id.0]
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DescriptorId, &PluginDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| (DescriptorId(index), descriptor))
    }

    pub fn find_by_name(&self, name: &str) -> Option<DescriptorId> {
        self.descriptors
            .iter()
            .position(|descriptor| descriptor.name() == name)
            .map(DescriptorId)
    }

    /// All descriptor ids in ascending lexicographic name order. Queue
    /// construction visits descriptors in this order so that load order
    /// is reproducible across runs with the same input set.
    pub fn ids_by_name(&self) -> Vec<DescriptorId> {
        let mut ids: Vec<DescriptorId> = (0..self.descriptors.len()).map(DescriptorId).collect();
        ids.sort_by(|a, b| self.descriptors[a.0].name().cmp(self.descriptors[b.0].name()));
        ids
    }

    fn name_of(&self, id: DescriptorId) -> String {
        self.descriptors[id.0].name().to_string()
    }

    /// Matches the declared dependencies of `id` against the registered
    /// descriptor set, by exact name.
    ///
    /// On success the forward edges are stored, the matching descriptors
    /// gain a reverse edge back to `id` and the state moves to
    /// `Resolved`. Every missing dependency is reported (the scan does
    /// not stop at the first); any miss leaves the state at `Read` with
    /// the forward edge list empty.
    pub fn resolve_dependencies(&mut self, id: DescriptorId) -> bool {
        if self.descriptors[id.0].has_error() {
            return false;
        }

        if self.descriptors[id.0].state() == PluginState::Resolved {
            // Re-resolution is permitted by first rolling back to Read.
            self.descriptors[id.0].state = PluginState::Read;
        }
        debug_assert_eq!(self.descriptors[id.0].state(), PluginState::Read);

        let dependencies = self.descriptors[id.0].dependencies.clone();
        let mut resolved = Vec::with_capacity(dependencies.len());
        for dependency in &dependencies {
            match self.find_by_name(&dependency.name) {
                Some(found) => {
                    if !self.descriptors[found.0].provides_for_ids.contains(&id) {
                        self.descriptors[found.0].provides_for_ids.push(id);
                    }
                    resolved.push(found);
                }
                None => {
                    let err = PluginSystemError::MissingDependency {
                        plugin: self.name_of(id),
                        dependency: dependency.name.clone(),
                    };
                    self.descriptors[id.0].record_error(&err.to_string());
                }
            }
        }

        if self.descriptors[id.0].has_error() {
            return false;
        }

        self.descriptors[id.0].dependency_ids = resolved;
        self.descriptors[id.0].state = PluginState::Resolved;
        true
    }

    /// Recomputes the indirect-disable flag of `id` and propagates the
    /// result through the reverse-dependency graph.
    ///
    /// A descriptor becomes indirectly disabled when any resolved
    /// dependency is disabled, errored, itself indirectly disabled or
    /// has a recorded initialization failure. With `force_resolve` the
    /// flag is always recomputed and propagation continues to every
    /// dependent regardless of whether it changed.
    pub fn resolve_indirectly_disabled(&mut self, id: DescriptorId, force_resolve: bool) {
        let mut visiting = Vec::new();
        self.resolve_indirectly_disabled_inner(id, force_resolve, &mut visiting);
    }

    /// The visiting stack is shared across the whole recursive
    /// propagation. Finding `id` already on it means a dependency cycle:
    /// the descriptor is marked sticky-circular, excluded from all
    /// future passes, and the full cycle path is recorded on it.
    fn resolve_indirectly_disabled_inner(
        &mut self,
        id: DescriptorId,
        force_resolve: bool,
        visiting: &mut Vec<DescriptorId>,
    ) {
        if self.descriptors[id.0].circular_dependency_detected() {
            return;
        }

        if visiting.contains(&id) {
            self.descriptors[id.0].indirectly_disabled = true;
            self.descriptors[id.0].circular_dependency_detected = true;

            // Propagation walks reverse edges, so reading the stack from
            // the top down yields the cycle in dependency order.
            let mut cycle = vec![self.name_of(id)];
            for &entry in visiting.iter().rev() {
                cycle.push(self.name_of(entry));
                if entry == id {
                    break;
                }
            }

            visiting.push(id);
            // Dependents of a cycle member must be re-resolved as well.
            let providers = self.descriptors[id.0].provides_for_ids.clone();
            for provider in providers {
                self.resolve_indirectly_disabled_inner(provider, true, visiting);
            }
            let err = PluginSystemError::CircularDependency(cycle);
            self.descriptors[id.0].record_error(&err.to_string());
            let me = visiting.pop();
            debug_assert_eq!(me, Some(id));
            return;
        }

        if force_resolve {
            self.descriptors[id.0].indirectly_disabled = false;
        } else if self.descriptors[id.0].is_indirectly_disabled() {
            return;
        }

        visiting.push(id);

        let dependency_ids = self.descriptors[id.0].dependency_ids.clone();
        for dependency in dependency_ids {
            let dependency = &self.descriptors[dependency.0];
            if dependency.has_error()
                || dependency.is_indirectly_disabled()
                || !dependency.is_enabled()
                || dependency.initialization_failed()
            {
                self.descriptors[id.0].indirectly_disabled = true;
                break;
            }
        }

        if self.descriptors[id.0].is_indirectly_disabled() || force_resolve {
            let providers = self.descriptors[id.0].provides_for_ids.clone();
            for provider in providers {
                self.resolve_indirectly_disabled_inner(provider, force_resolve, visiting);
            }
        }

        let me = visiting.pop();
        debug_assert_eq!(me, Some(id));
    }

    /// Depth-first topological insertion of `id` and its dependencies
    /// into `queue`, dependencies strictly first.
    ///
    /// Returns false when `id` is excluded (disabled or indirectly
    /// disabled, which is not a failure of the caller) or when a cycle
    /// or failed dependency makes it unloadable. `visiting` is the
    /// path-local cycle check list for one top-level call.
    pub fn load_queue_into(
        &mut self,
        id: DescriptorId,
        queue: &mut Vec<DescriptorId>,
        visiting: &mut Vec<DescriptorId>,
    ) -> bool {
        // A dependency that never resolved (state below Resolved) can
        // still be reached through the edges of its dependents.
        if self.descriptors[id.0].state() < PluginState::Resolved {
            return false;
        }

        if !self.descriptors[id.0].is_enabled() || self.descriptors[id.0].is_indirectly_disabled()
        {
            return false;
        }

        if queue.contains(&id) {
            return true;
        }

        if visiting.contains(&id) {
            let mut cycle: Vec<String> =
                visiting.iter().map(|&entry| self.name_of(entry)).collect();
            cycle.push(self.name_of(id));
            let err = PluginSystemError::CircularDependency(cycle);
            self.descriptors[id.0].record_error(&err.to_string());
            return false;
        }
        visiting.push(id);

        let dependency_ids = self.descriptors[id.0].dependency_ids.clone();
        for dependency in dependency_ids {
            if !self.load_queue_into(dependency, queue, visiting) {
                let message = format!(
                    "Plugin {} cannot be loaded because dependency {} failed.",
                    self.name_of(id),
                    self.name_of(dependency)
                );
                self.descriptors[id.0].record_error(&message);
                return false;
            }
        }

        queue.push(id);
        true
    }

    /// Depth-first topological insertion over the reverse graph:
    /// dependents land in `queue` strictly before `id`.
    ///
    /// A descriptor that was loaded stays eligible for unloading even
    /// when it has been disabled since.
    pub fn unload_queue_into(
        &mut self,
        id: DescriptorId,
        queue: &mut Vec<DescriptorId>,
        visiting: &mut Vec<DescriptorId>,
    ) -> bool {
        // Reverse edges are registered per found dependency, so a
        // descriptor whose own resolution failed (state Read) can still
        // appear as a provider target here.
        if self.descriptors[id.0].state() < PluginState::Resolved {
            return false;
        }

        if (!self.descriptors[id.0].is_enabled()
            || self.descriptors[id.0].is_indirectly_disabled())
            && self.descriptors[id.0].state() < PluginState::Loaded
        {
            return false;
        }

        if queue.contains(&id) {
            return true;
        }

        if visiting.contains(&id) {
            let mut cycle: Vec<String> =
                visiting.iter().map(|&entry| self.name_of(entry)).collect();
            cycle.push(self.name_of(id));
            let err = PluginSystemError::CircularDependency(cycle);
            self.descriptors[id.0].record_error(&err.to_string());
            return false;
        }
        visiting.push(id);

        let providers = self.descriptors[id.0].provides_for_ids.clone();
        for provider in providers {
            self.unload_queue_into(provider, queue, visiting);
        }

        queue.push(id);
        true
    }

    /// Builds the global load queue: every enabled, non-indirectly
    /// disabled resolved descriptor exactly once, each preceded by all
    /// of its resolved dependencies. Independent subgraphs are visited
    /// in ascending name order.
    pub fn load_queue(&mut self) -> Vec<DescriptorId> {
        let mut queue = Vec::new();
        for id in self.ids_by_name() {
            if self.descriptors[id.0].state() >= PluginState::Resolved {
                let mut visiting = Vec::new();
                self.load_queue_into(id, &mut queue, &mut visiting);
            }
        }
        debug!(
            "Load queue: {:?}",
            queue.iter().map(|&id| self.name_of(id)).collect::<Vec<_>>()
        );
        queue
    }

    /// Builds the global unload queue over the reverse graph from every
    /// loaded descriptor: dependents strictly before dependencies.
    pub fn unload_queue(&mut self) -> Vec<DescriptorId> {
        let mut queue = Vec::new();
        for id in self.ids_by_name() {
            if self.descriptors[id.0].state() >= PluginState::Loaded {
                let mut visiting = Vec::new();
                self.unload_queue_into(id, &mut queue, &mut visiting);
            }
        }
        debug!(
            "Unload queue: {:?}",
            queue.iter().map(|&id| self.name_of(id)).collect::<Vec<_>>()
        );
        queue
    }

    /// Loads the code module for `id` and attaches the instance.
    ///
    /// Skips silently when a dependency has no instance yet (it should
    /// have appeared earlier in the load queue); records an error and
    /// leaves the state at `Resolved` when the loader fails.
    pub fn load_plugin(&mut self, id: DescriptorId, loader: &dyn ModuleLoader) -> bool {
        debug_assert_eq!(self.descriptors[id.0].state(), PluginState::Resolved);
        if self.descriptors[id.0].state() != PluginState::Resolved {
            return false;
        }

        let dependency_ids = self.descriptors[id.0].dependency_ids.clone();
        for dependency in dependency_ids {
            if !self.descriptors[dependency.0].is_loaded() {
                // A plugin this one depends on should be loaded before it
                // and is not.
                return false;
            }
        }

        let directory = self.descriptors[id.0].file_path().to_path_buf();
        let name = self.name_of(id);
        match loader.load(&directory, &name) {
            Ok(handle) => {
                self.descriptors[id.0].instance = Some(handle);
                self.descriptors[id.0].state = PluginState::Loaded;
                true
            }
            Err(err) => {
                warn!("{}", err);
                self.descriptors[id.0].record_error(&err.to_string());
                false
            }
        }
    }

    /// Initializes the loaded instance of `id`.
    ///
    /// On failure the error is recorded, `initialization_failed` is set
    /// and the state stays at `Loaded`; the caller decides whether to
    /// cascade (unload dependents) or abort (shutdown request).
    pub fn initialize_plugin(&mut self, id: DescriptorId) -> bool {
        debug_assert_eq!(self.descriptors[id.0].state(), PluginState::Loaded);

        let result = match self.descriptors[id.0].instance.as_mut() {
            Some(handle) => handle.plugin_mut().initialize(),
            None => return false,
        };

        match result {
            Ok(()) => {
                self.descriptors[id.0].initialization_failed = false;
                self.descriptors[id.0].state = PluginState::Initialized;
                debug!("Plugin initialized: {}", self.name_of(id));
                true
            }
            Err(message) => {
                let err = PluginSystemError::InitializationError {
                    plugin: self.name_of(id),
                    message,
                };
                warn!("{}", err);
                self.descriptors[id.0].record_error(&err.to_string());
                self.descriptors[id.0].initialization_failed = true;
                false
            }
        }
    }

    /// Whether the loaded instance of `id` demands application shutdown.
    /// Meaningful only after a failed initialization.
    pub fn plugin_shutdown_requested(&self, id: DescriptorId) -> bool {
        self.descriptors[id.0]
            .instance
            .as_ref()
            .map(|handle| handle.plugin().is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Shuts down (when initialized) and releases the instance of `id`,
    /// rolling the state back to `Resolved`.
    ///
    /// The state reset is optimistic: if the underlying module cannot
    /// actually be unmapped the descriptor still counts as unloaded.
    pub fn unload_plugin(&mut self, id: DescriptorId) {
        if self.descriptors[id.0].instance.is_none() {
            return;
        }

        if self.descriptors[id.0].state() >= PluginState::Initialized {
            if let Some(handle) = self.descriptors[id.0].instance.as_mut() {
                handle.plugin_mut().shutdown();
            }
        }

        self.descriptors[id.0].instance = None;
        self.descriptors[id.0].state = PluginState::Resolved;
        debug!("Plugin unloaded: {}", self.name_of(id));
    }
}
