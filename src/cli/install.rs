//! `npmi install`.

use anyhow::{Result, anyhow};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use crate::build::BuildRunner;
use crate::cache::{ArchiveCache, CacheMode};
use crate::config::GlobalConfig;
use crate::constants::MANIFEST_FILE;
use crate::fetch::SourceFetcher;
use crate::installer::{InstallLock, InstallOptions, InstallStats, Installer};

/// Install the dependency tree of a project.
///
/// # Examples
///
/// ```bash
/// # Install into the current directory
/// npmi install
///
/// # Install without keeping archives
/// npmi install ./app --no-cache
///
/// # Offline install from a directory of <name>/<spec>.tgz files
/// npmi install --registry ./mirror
/// ```
#[derive(Args, Debug, Default, Clone)]
pub struct InstallCommand {
    /// Project directory containing package.json (defaults to the current directory)
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Do not read or write the persistent archive cache
    #[arg(long)]
    pub no_cache: bool,

    /// Maximum number of concurrent fetches per directory
    #[arg(long, value_name = "NUM")]
    pub max_parallel: Option<usize>,

    /// Registry URL, file:// URL or mirror directory
    #[arg(long, value_name = "URL")]
    pub registry: Option<String>,

    /// Native build tool to run for packages with a binding.gyp
    #[arg(long, value_name = "PATH")]
    pub build_tool: Option<String>,

    /// Per-fetch timeout in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub fetch_timeout: Option<u64>,

    /// Per-build-phase timeout in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub build_timeout: Option<u64>,
}

impl InstallCommand {
    /// Layer command-line flags over `config`.
    pub fn apply_to(&self, config: &mut GlobalConfig) {
        if self.no_cache {
            config.cache_mode = CacheMode::Ephemeral;
        }
        if let Some(max_parallel) = self.max_parallel {
            config.max_parallel = Some(max_parallel);
        }
        if let Some(registry) = &self.registry {
            config.registry.clone_from(registry);
        }
        if let Some(tool) = &self.build_tool {
            config.build_tool.clone_from(tool);
        }
        if let Some(secs) = self.fetch_timeout {
            config.fetch_timeout_secs = secs;
        }
        if let Some(secs) = self.build_timeout {
            config.build_timeout_secs = secs;
        }
    }

    /// Run the install and print a summary.
    pub async fn execute(self, mut config: GlobalConfig) -> Result<()> {
        self.apply_to(&mut config);
        config.validate()?;

        let stats = self.run(&config).await?;

        let noun = if stats.total() == 1 { "package" } else { "packages" };
        println!(
            "{} Installed {} {} ({} fetched, {} built, {} up to date)",
            "✓".green(),
            stats.total(),
            noun,
            stats.fetched,
            stats.built,
            stats.skipped
        );
        Ok(())
    }

    async fn run(&self, config: &GlobalConfig) -> Result<InstallStats> {
        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }
        if !dir.join(MANIFEST_FILE).exists() {
            tracing::warn!("No {} in {}, nothing to install", MANIFEST_FILE, dir.display());
            return Ok(InstallStats::default());
        }

        let fetcher = SourceFetcher::from_registry(&config.registry)?;
        let cache = match config.cache_mode {
            CacheMode::Persistent => {
                ArchiveCache::persistent(config.cache_dir()?, config.fetch_timeout())
            }
            CacheMode::Ephemeral => ArchiveCache::ephemeral(config.fetch_timeout()),
        };
        let builder = BuildRunner::new(&config.build_tool)
            .with_timeout(config.build_timeout())
            .inherit_output(config.inherit_build_output);
        let options = InstallOptions {
            max_parallel: config.max_parallel(),
        };

        tracing::debug!(
            "Installing {} from {} ({:?} cache, {} parallel fetches)",
            dir.display(),
            config.registry,
            config.cache_mode,
            options.max_parallel
        );

        let _lock = InstallLock::acquire(&dir).await?;
        let installer = Installer::new(fetcher, cache, builder, options);

        // Dropping the installer on interrupt releases ephemeral scratch space.
        tokio::select! {
            result = installer.install(&dir) => result,
            _ = tokio::signal::ctrl_c() => Err(anyhow!("Interrupted")),
        }
    }
}
