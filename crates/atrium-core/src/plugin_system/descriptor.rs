//! Plugin descriptors: the parsed, stateful record for one plugin.
//!
//! A [`PluginDescriptor`] carries the metadata declared in a plugin's
//! `.spec` file (name, version, category, dependency list), the state
//! derived during dependency resolution (forward and reverse graph
//! edges as arena indices), the user-facing enable flags, the lifecycle
//! state machine and an accumulating error string.
//!
//! The descriptor owns its loaded plugin instance once the module has
//! been loaded; releasing the handle is the unload operation. Graph
//! traversals that need to follow edges across descriptors live on
//! [`PluginRegistry`](crate::plugin_system::registry::PluginRegistry),
//! which owns the descriptor arena.

use std::fs;
use std::path::{Path, PathBuf};

use crate::plugin_system::dependency::PluginDependency;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::PluginHandle;
use crate::plugin_system::registry::DescriptorId;
use crate::plugin_system::version;

const PLUGIN_ELEMENT: &str = "plugin";
const NAME_ATTRIBUTE: &str = "name";
const VERSION_ATTRIBUTE: &str = "version";
const DESCRIPTION_ELEMENT: &str = "description";
const CATEGORY_ELEMENT: &str = "category";
const DEPENDENCY_LIST_ELEMENT: &str = "dependencyList";
const DEPENDENCY_ELEMENT: &str = "dependency";

/// Lifecycle state of a descriptor.
///
/// States are strictly increasing within one load cycle; unloading
/// rolls `Loaded`/`Initialized` back to `Resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PluginState {
    /// Nothing has been read successfully yet.
    Invalid,
    /// The descriptor file was parsed.
    Read,
    /// All declared dependencies were matched to known descriptors.
    Resolved,
    /// The code module is loaded and an instance exists.
    Loaded,
    /// The plugin instance initialized successfully.
    Initialized,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Invalid => "Invalid",
            PluginState::Read => "Read",
            PluginState::Resolved => "Resolved",
            PluginState::Loaded => "Loaded",
            PluginState::Initialized => "Initialized",
        }
    }
}

/// The parsed, stateful record for one plugin.
#[derive(Default)]
pub struct PluginDescriptor {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) description: String,
    pub(crate) category: String,
    pub(crate) dependencies: Vec<PluginDependency>,
    pub(crate) file_path: PathBuf,
    pub(crate) file_name: String,

    /// Resolved forward edges; valid once `state >= Resolved`.
    pub(crate) dependency_ids: Vec<DescriptorId>,
    /// Reverse edges: descriptors that declared a dependency on this one.
    pub(crate) provides_for_ids: Vec<DescriptorId>,

    pub(crate) enabled: bool,
    pub(crate) persistent: bool,
    pub(crate) indirectly_disabled: bool,
    pub(crate) initialization_failed: bool,
    pub(crate) circular_dependency_detected: bool,

    pub(crate) state: PluginState,
    pub(crate) has_error: bool,
    pub(crate) error_string: String,

    pub(crate) instance: Option<PluginHandle>,
}

impl Default for PluginState {
    fn default() -> Self {
        PluginState::Invalid
    }
}

impl PluginDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the descriptor file at `path`.
    ///
    /// On success the declared fields are populated, the state moves to
    /// [`PluginState::Read`] and the plugin is enabled. Any problem
    /// (missing file, malformed markup, missing plugin or dependency
    /// name) is appended to the error string and leaves the state at
    /// [`PluginState::Invalid`].
    pub fn read(&mut self, path: &Path) -> Result<(), PluginSystemError> {
        self.reset();

        if !path.exists() {
            return Err(self.parse_error(format!("File does not exist: {}", path.display())));
        }
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                return Err(self.parse_error(format!(
                    "File could not be opened for read: {}: {}",
                    path.display(),
                    err
                )));
            }
        };

        self.file_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.read_source(&source)
    }

    /// Parses descriptor markup from an already loaded text source.
    ///
    /// `file_path`/`file_name` are left untouched so callers injecting
    /// sources directly (tests, embedded descriptors) can set them
    /// beforehand via [`PluginDescriptor::read`].
    pub fn read_source(&mut self, source: &str) -> Result<(), PluginSystemError> {
        let document = match roxmltree::Document::parse(source) {
            Ok(document) => document,
            Err(err) => {
                return Err(self.parse_error(format!(
                    "Error parsing descriptor file {}: {}",
                    self.file_name, err
                )));
            }
        };

        let root = document.root_element();
        if root.tag_name().name() != PLUGIN_ELEMENT {
            return Err(self.parse_error(format!(
                "Expected element '{}' as top level element",
                PLUGIN_ELEMENT
            )));
        }

        let name = root.attribute(NAME_ATTRIBUTE).unwrap_or_default();
        if name.is_empty() {
            return Err(self.parse_error(format!(
                "Expected attribute '{}' at element {}",
                NAME_ATTRIBUTE, PLUGIN_ELEMENT
            )));
        }
        self.name = name.to_string();

        let declared_version = root.attribute(VERSION_ATTRIBUTE).unwrap_or_default();
        // An invalid version is discarded, not an error.
        if version::is_valid(declared_version) {
            self.version = declared_version.to_string();
        }

        for child in root.children().filter(|node| node.is_element()) {
            match child.tag_name().name() {
                DESCRIPTION_ELEMENT => {
                    self.description = child.text().unwrap_or_default().trim().to_string();
                }
                CATEGORY_ELEMENT => {
                    self.category = child.text().unwrap_or_default().trim().to_string();
                }
                DEPENDENCY_LIST_ELEMENT => {
                    self.read_dependencies(child)?;
                }
                _ => {}
            }
        }

        self.state = PluginState::Read;
        self.enabled = true;
        Ok(())
    }

    fn read_dependencies(&mut self, list: roxmltree::Node) -> Result<(), PluginSystemError> {
        for entry in list.children().filter(|node| node.is_element()) {
            if entry.tag_name().name() != DEPENDENCY_ELEMENT {
                continue;
            }
            let name = entry.attribute(NAME_ATTRIBUTE).unwrap_or_default();
            if name.is_empty() {
                return Err(self.parse_error(format!(
                    "Expected attribute '{}' at element {}",
                    NAME_ATTRIBUTE, DEPENDENCY_ELEMENT
                )));
            }
            let version = entry.attribute(VERSION_ATTRIBUTE).unwrap_or_default();
            self.dependencies
                .push(PluginDependency::versioned(name, version));
        }
        Ok(())
    }

    /// Clears all parsed and derived state ahead of a fresh read.
    fn reset(&mut self) {
        self.name.clear();
        self.version.clear();
        self.description.clear();
        self.category.clear();
        self.dependencies.clear();
        self.error_string.clear();
        self.dependency_ids.clear();
        self.provides_for_ids.clear();
        self.enabled = false;
        self.indirectly_disabled = false;
        self.circular_dependency_detected = false;
        self.initialization_failed = false;
        self.instance = None;
        self.state = PluginState::Invalid;
        self.has_error = false;
    }

    /// Appends a line to the accumulated error string and flags the
    /// descriptor as errored.
    pub(crate) fn record_error(&mut self, message: &str) {
        if !self.error_string.is_empty() {
            self.error_string.push('\n');
        }
        self.error_string.push_str(message);
        self.has_error = true;
    }

    /// Records a parse failure and builds the matching error value.
    fn parse_error(&mut self, message: String) -> PluginSystemError {
        self.record_error(&message);
        PluginSystemError::ParseError {
            path: self.file_path.join(&self.file_name),
            message,
            source: None,
        }
    }

    /// Enables or disables loading at startup.
    ///
    /// Disabling a persistent descriptor is a no-op.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.persistent && !enabled {
            return;
        }
        self.enabled = enabled;
    }

    /// Whether the plugin should be loaded at startup.
    pub fn is_enabled(&self) -> bool {
        self.enabled || self.persistent
    }

    /// Marks the descriptor as persistent (cannot be disabled).
    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
        if persistent {
            self.enabled = true;
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// True when loading was skipped because a dependency is disabled,
    /// errored or failed to initialize.
    pub fn is_indirectly_disabled(&self) -> bool {
        self.indirectly_disabled
    }

    pub fn initialization_failed(&self) -> bool {
        self.initialization_failed
    }

    pub fn circular_dependency_detected(&self) -> bool {
        self.circular_dependency_detected
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Grouping label; empty means uncategorized.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Declared dependencies, in descriptor order.
    pub fn dependencies(&self) -> &[PluginDependency] {
        &self.dependencies
    }

    /// Directory the descriptor file was read from.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Resolved dependency edges; valid once `state >= Resolved`.
    pub fn dependency_ids(&self) -> &[DescriptorId] {
        &self.dependency_ids
    }

    /// Descriptors that depend on this one.
    pub fn provides_for_ids(&self) -> &[DescriptorId] {
        &self.provides_for_ids
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Accumulated, possibly multi-line, user-readable error text.
    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    /// Whether a loaded plugin instance is attached; true if and only if
    /// `state >= Loaded`.
    pub fn is_loaded(&self) -> bool {
        self.instance.is_some()
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("indirectly_disabled", &self.indirectly_disabled)
            .field("has_error", &self.has_error)
            .finish_non_exhaustive()
    }
}
