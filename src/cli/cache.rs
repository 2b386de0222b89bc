//! `npmi cache`.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::cache::ArchiveCache;
use crate::config::GlobalConfig;

/// Inspect or clear the persistent archive cache.
#[derive(Args, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum CacheSubcommand {
    /// Print the cache directory
    Dir,
    /// Remove every cached archive
    Clean,
}

impl CacheCommand {
    /// Run the selected cache operation.
    pub async fn execute(self, config: &GlobalConfig) -> Result<()> {
        let dir = config.cache_dir()?;

        match self.command {
            CacheSubcommand::Dir => println!("{}", dir.display()),
            CacheSubcommand::Clean => {
                let removed = ArchiveCache::persistent(&dir, None).clean().await?;
                println!(
                    "{} Removed {} cached archives from {}",
                    "✓".green(),
                    removed,
                    dir.display()
                );
            }
        }
        Ok(())
    }
}
