use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Atrium: a plugin-hosting application shell
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Directories to search recursively for plugin descriptors
    #[arg(long = "plugin-dir", value_name = "DIR")]
    pub plugin_dirs: Vec<PathBuf>,

    /// Settings file holding the disabled-plugin list
    #[arg(long, value_name = "FILE", default_value = "atrium-settings.json")]
    pub settings: PathBuf,

    /// Plugins the host cannot run without; they stay enabled
    #[arg(long = "persistent", value_name = "NAME")]
    pub persistent: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List discovered plugins with their resolution state
    List,
    /// Enable a plugin (persisted)
    Enable {
        /// The name of the plugin to enable
        name: String,
    },
    /// Disable a plugin (persisted)
    Disable {
        /// The name of the plugin to disable
        name: String,
    },
    /// Run a full load and initialize cycle
    Load,
}
