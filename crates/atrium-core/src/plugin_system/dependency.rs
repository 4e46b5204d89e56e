use std::fmt;

use crate::plugin_system::version;

/// A named, optionally versioned requirement on another plugin, as
/// declared in a descriptor's `dependencyList`.
///
/// Immutable once parsed. The version is informational display data:
/// resolution matches by name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDependency {
    /// Name of the required plugin.
    pub name: String,

    /// Declared version of the required plugin, if any. Strings that do
    /// not match the version grammar are discarded at parse time.
    pub version: Option<String>,
}

impl PluginDependency {
    /// Creates a dependency on any version of the named plugin.
    pub fn any(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
        }
    }

    /// Creates a dependency carrying a declared version. The version is
    /// kept only when it matches the descriptor version grammar.
    pub fn versioned(name: &str, version: &str) -> Self {
        let version = if version::is_valid(version) {
            Some(version.to_string())
        } else {
            None
        };
        Self {
            name: name.to_string(),
            version,
        }
    }
}

impl fmt::Display for PluginDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} ({})", self.name, version),
            None => write!(f, "{} (any version)", self.name),
        }
    }
}
