//! Settings persistence for the plugin manager.
//!
//! The manager only persists one piece of state across runs: the set of
//! plugin names the user disabled. [`SettingsStore`] abstracts where
//! that set lives; [`JsonSettingsStore`] keeps it in a JSON file,
//! [`MemorySettingsStore`] keeps it in memory for tests.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::error::StorageError;

/// Key-value style store read at startup and written at shutdown.
pub trait SettingsStore {
    /// The persisted disabled-plugin name set.
    fn disabled_plugins(&self) -> Result<BTreeSet<String>, StorageError>;

    /// Replaces the persisted disabled-plugin name set.
    fn set_disabled_plugins(&mut self, names: &BTreeSet<String>) -> Result<(), StorageError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    disabled_plugins: Vec<String>,
}

/// Stores settings in a JSON file. A missing file reads as empty.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn disabled_plugins(&self) -> Result<BTreeSet<String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let text = fs::read_to_string(&self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        let file: SettingsFile = serde_json::from_str(&text)?;
        Ok(file.disabled_plugins.into_iter().collect())
    }

    fn set_disabled_plugins(&mut self, names: &BTreeSet<String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = SettingsFile {
            disabled_plugins: names.iter().cloned().collect(),
        };
        let text = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, text).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-memory store, used by tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    disabled: BTreeSet<String>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disabled<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disabled: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn disabled_plugins(&self) -> Result<BTreeSet<String>, StorageError> {
        Ok(self.disabled.clone())
    }

    fn set_disabled_plugins(&mut self, names: &BTreeSet<String>) -> Result<(), StorageError> {
        self.disabled = names.clone();
        Ok(())
    }
}
