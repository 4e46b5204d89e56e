mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use atrium_core::plugin_system::{
    DynamicModuleLoader, InitializationObserver, PluginManager, PluginState,
};
use atrium_core::storage::JsonSettingsStore;

use cli::{CliArgs, Command};

/// Progress sink printing plugin names to the console, standing in for
/// the splash screen of a graphical host.
struct ConsoleObserver;

impl InitializationObserver for ConsoleObserver {
    fn status(&mut self, plugin_name: &str) {
        println!("Initializing plugin: {}", plugin_name);
    }

    fn plugins_initialized(&mut self) {
        println!("All plugins initialized.");
    }
}

fn plugin_dirs(args: &CliArgs) -> Vec<PathBuf> {
    if !args.plugin_dirs.is_empty() {
        return args.plugin_dirs.clone();
    }
    // Default: a `plugins` directory next to the executable.
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("plugins")))
        .into_iter()
        .collect()
}

fn list_plugins(manager: &PluginManager) {
    for (_, descriptor) in manager.registry().iter() {
        let enabled = if descriptor.is_enabled() {
            "enabled"
        } else {
            "disabled"
        };
        println!(
            "{} {} [{}] ({}, {})",
            descriptor.name(),
            descriptor.version(),
            descriptor.category(),
            enabled,
            descriptor.state().as_str()
        );
        if descriptor.is_indirectly_disabled() {
            println!("  indirectly disabled");
        }
        if descriptor.has_error() {
            for line in descriptor.error_string().lines() {
                println!("  error: {}", line);
            }
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args = CliArgs::parse();
    let dirs = plugin_dirs(&args);
    if dirs.is_empty() {
        error!("No plugin directories given and none could be derived");
        return ExitCode::FAILURE;
    }

    let mut manager = PluginManager::new(
        Box::new(DynamicModuleLoader::new()),
        Box::new(JsonSettingsStore::new(&args.settings)),
    );
    for name in &args.persistent {
        manager.mark_persistent(name);
    }

    match args.command {
        Command::List => {
            manager.scan_plugins(&dirs);
            list_plugins(&manager);
            ExitCode::SUCCESS
        }
        Command::Enable { name } => {
            manager.scan_plugins(&dirs);
            manager.set_plugin_enabled(&name, true);
            manager.save_settings();
            println!("Plugin {} enabled.", name);
            ExitCode::SUCCESS
        }
        Command::Disable { name } => {
            manager.scan_plugins(&dirs);
            manager.set_plugin_enabled(&name, false);
            manager.save_settings();
            if manager
                .registry()
                .find_by_name(&name)
                .map(|id| manager.registry().descriptor(id).is_persistent())
                .unwrap_or(false)
            {
                println!("Plugin {} is persistent and stays enabled.", name);
            } else {
                println!("Plugin {} disabled.", name);
            }
            ExitCode::SUCCESS
        }
        Command::Load => {
            manager.load_plugins(&dirs);
            let mut observer = ConsoleObserver;
            let all_initialized = manager.initialize_plugins(&mut observer);
            if let Some(plugin) = manager.shutdown_requested() {
                error!("Plugin '{}' requested application shutdown", plugin);
                let plugin = plugin.to_string();
                manager.unload_plugins();
                println!("Aborted: plugin '{}' requested shutdown.", plugin);
                return ExitCode::FAILURE;
            }
            if !all_initialized {
                for (_, descriptor) in manager.registry().iter() {
                    if descriptor.state() != PluginState::Initialized && descriptor.has_error() {
                        println!("{}: {}", descriptor.name(), descriptor.error_string());
                    }
                }
            }
            manager.unload_plugins();
            ExitCode::SUCCESS
        }
    }
}
