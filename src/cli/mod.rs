//! Command-line interface for npmi.
//!
//! # Commands
//!
//! - `install [DIR]` - install the dependency tree of `DIR/package.json`
//! - `cache dir` - print the persistent cache directory
//! - `cache clean` - remove every cached archive
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - debug logging and build tool output on the terminal
//! - `--quiet` / `-q` - warnings and errors only
//! - `--config` / `-c` - path of the global config file
//!
//! Settings are layered: built-in defaults, `~/.npmi/config.toml`, `NPMI_*`
//! environment variables, then command-line flags.

mod cache;
mod install;

#[cfg(test)]
mod tests;

pub use cache::CacheCommand;
pub use install::InstallCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::GlobalConfig;

/// Settings derived from global flags, applied before any command runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Default log level when `RUST_LOG` is not set
    pub log_level: String,
    /// Whether build tool output goes straight to the terminal
    pub verbose: bool,
    /// Explicit config file path
    pub config_path: Option<PathBuf>,
}

/// npmi command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "npmi",
    about = "Recursive package.json dependency installer",
    version,
    long_about = "npmi fetches the dependencies declared in package.json, unpacks them into \
                  node_modules, installs their own dependencies recursively and runs native \
                  builds for packages that ship a binding.gyp."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging and show build tool output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the global configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the dependencies declared in package.json
    Install(InstallCommand),

    /// Inspect or clear the archive cache
    Cache(CacheCommand),
}

impl Cli {
    /// Run the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };

        CliConfig {
            log_level: log_level.to_string(),
            verbose: self.verbose,
            config_path: self.config.clone(),
        }
    }

    /// Run the selected command with an already built [`CliConfig`].
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let mut global = GlobalConfig::load_with_optional(config.config_path.clone()).await?;
        if config.verbose {
            global.inherit_build_output = true;
        }

        match self.command {
            Commands::Install(cmd) => cmd.execute(global).await,
            Commands::Cache(cmd) => cmd.execute(&global).await,
        }
    }
}
