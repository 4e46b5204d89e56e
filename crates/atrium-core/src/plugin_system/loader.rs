//! Code module loading collaborator.
//!
//! Turns a resolved descriptor location into a live [`Plugin`] instance.
//! [`DynamicModuleLoader`] loads a shared library named after the plugin
//! and resolves its exported constructor; [`StaticModuleLoader`] serves
//! compiled-in plugins from a factory map and doubles as the test
//! loader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use libloading::Library;
use log::debug;

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::traits::Plugin;

/// Symbol every dynamically loadable plugin module must export:
/// `#[unsafe(no_mangle)] pub extern "C" fn atrium_plugin_create() -> *mut dyn Plugin`.
pub const PLUGIN_CREATE_SYMBOL: &[u8] = b"atrium_plugin_create";

type PluginCreate = unsafe fn() -> *mut dyn Plugin;

/// Builds the deterministic, platform-specific module file name for a
/// plugin, e.g. `dir/libreport.so` on Linux for plugin `report`.
pub fn module_file_name(dir: &Path, plugin_name: &str) -> PathBuf {
    dir.join(format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        plugin_name.to_lowercase(),
        std::env::consts::DLL_SUFFIX
    ))
}

/// An instantiated plugin together with whatever keeps its code alive.
///
/// Dropping the handle is the unload operation. The instance is declared
/// before the library so it is destroyed while its code is still mapped.
pub struct PluginHandle {
    plugin: Box<dyn Plugin>,
    _library: Option<Library>,
}

impl PluginHandle {
    /// Wraps an in-process plugin instance with no backing library.
    pub fn from_instance(plugin: Box<dyn Plugin>) -> Self {
        Self {
            plugin,
            _library: None,
        }
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn plugin_mut(&mut self) -> &mut dyn Plugin {
        self.plugin.as_mut()
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("dynamic", &self._library.is_some())
            .finish()
    }
}

/// Loads a native code module for a descriptor and obtains one instance
/// implementing the plugin capability interface.
pub trait ModuleLoader {
    /// Loads the module for `plugin_name` found under `dir` and returns
    /// a handle owning the new instance.
    fn load(&self, dir: &Path, plugin_name: &str) -> Result<PluginHandle, PluginSystemError>;
}

/// Loader backed by `libloading`.
#[derive(Debug, Default)]
pub struct DynamicModuleLoader;

impl DynamicModuleLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for DynamicModuleLoader {
    fn load(&self, dir: &Path, plugin_name: &str) -> Result<PluginHandle, PluginSystemError> {
        let library_path = module_file_name(dir, plugin_name);
        if !library_path.exists() {
            return Err(PluginSystemError::LoadingError {
                plugin: plugin_name.to_string(),
                path: library_path.clone(),
                message: "module file does not exist".to_string(),
            });
        }

        // Safety: the module is trusted code discovered next to its own
        // descriptor; the constructor contract is part of the plugin ABI.
        let library = unsafe { Library::new(&library_path) }.map_err(|err| {
            PluginSystemError::LoadingError {
                plugin: plugin_name.to_string(),
                path: library_path.clone(),
                message: err.to_string(),
            }
        })?;

        let plugin = unsafe {
            let constructor = library
                .get::<PluginCreate>(PLUGIN_CREATE_SYMBOL)
                .map_err(|err| PluginSystemError::LoadingError {
                    plugin: plugin_name.to_string(),
                    path: library_path.clone(),
                    message: err.to_string(),
                })?;
            let raw = constructor();
            if raw.is_null() {
                return Err(PluginSystemError::LoadingError {
                    plugin: plugin_name.to_string(),
                    path: library_path,
                    message: "plugin constructor returned null".to_string(),
                });
            }
            Box::from_raw(raw)
        };

        debug!("Plugin loaded: {}", library_path.display());
        Ok(PluginHandle {
            plugin,
            _library: Some(library),
        })
    }
}

/// Factory signature for statically registered plugins.
pub type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin>>;

/// Loader serving plugin instances from an in-process factory map,
/// keyed by plugin name. Used for compiled-in plugins and in tests.
#[derive(Default)]
pub struct StaticModuleLoader {
    factories: HashMap<String, PluginFactory>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `plugin_name`, replacing any previous one.
    pub fn register<F>(&mut self, plugin_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + 'static,
    {
        self.factories
            .insert(plugin_name.to_string(), Box::new(factory));
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, dir: &Path, plugin_name: &str) -> Result<PluginHandle, PluginSystemError> {
        match self.factories.get(plugin_name) {
            Some(factory) => Ok(PluginHandle::from_instance(factory())),
            None => Err(PluginSystemError::LoadingError {
                plugin: plugin_name.to_string(),
                path: module_file_name(dir, plugin_name),
                message: "no factory registered".to_string(),
            }),
        }
    }
}
