//! Recursive dependency installation.
//!
//! [`Installer::install`] walks a tree of `package.json` manifests depth first.
//! For each directory it:
//!
//! 1. reads the manifest (no manifest, or no dependencies, means done)
//! 2. resolves every dependency through the [`ArchiveCache`] concurrently,
//!    bounded by `max_parallel`, skipping destinations that are already
//!    satisfied or are symlinks
//! 3. waits for all of them, and stops with the first failure in declared
//!    order if any failed; nothing at this level is installed in that case
//! 4. then, strictly in declared order, for each resolved dependency:
//!    materialize it, install its own dependencies, run its native build,
//!    and write its marker
//!
//! A dependency's subtree is completely installed and built before its next
//! sibling is touched. The first failure in step 4 aborts the remaining
//! siblings; siblings that already completed stay installed.
//!
//! # Idempotence
//!
//! The marker is written last, so a dependency whose marker matches the
//! requested `name:spec` is known to be fully installed, including its
//! subtree and build. A second run over an unchanged tree performs no fetch,
//! extraction or build.
//!
//! # Errors
//!
//! Errors are propagated unchanged: the typed [`NpmiError`](crate::core::NpmiError)
//! raised deep in the tree is the one the caller sees.

mod install_lock;
pub mod marker;
mod materialize;


pub use install_lock::InstallLock;
pub use marker::DestinationState;
pub use materialize::materialize;

use anyhow::Result;
use futures::StreamExt;
use futures::future::BoxFuture;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use crate::build::BuildRunner;
use crate::cache::{ArchiveCache, CacheEntry};
use crate::constants::{MODULES_DIR, default_max_parallel};
use crate::core::Dependency;
use crate::fetch::Fetcher;
use crate::manifest;

/// Tunables for an install run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    /// Maximum concurrent fetches per directory
    pub max_parallel: usize,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

/// Counts reported after a successful install, summed over the whole tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallStats {
    /// Dependencies whose archive was resolved through the cache
    pub fetched: usize,
    /// Dependencies materialized and marked
    pub installed: usize,
    /// Dependencies that ran a native build
    pub built: usize,
    /// Dependencies left alone: satisfied marker or symlink
    pub skipped: usize,
}

impl InstallStats {
    /// Installed plus skipped dependencies.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.installed + self.skipped
    }
}

impl AddAssign for InstallStats {
    fn add_assign(&mut self, other: Self) {
        self.fetched += other.fetched;
        self.installed += other.installed;
        self.built += other.built;
        self.skipped += other.skipped;
    }
}

/// Outcome of the concurrent phase for one dependency.
enum Planned {
    Skip(DestinationState),
    Install(CacheEntry),
}

/// Installs dependency trees.
pub struct Installer<F: Fetcher> {
    fetcher: F,
    cache: ArchiveCache,
    builder: BuildRunner,
    options: InstallOptions,
}

impl<F: Fetcher> Installer<F> {
    /// Create an installer from its collaborators.
    pub fn new(fetcher: F, cache: ArchiveCache, builder: BuildRunner, options: InstallOptions) -> Self {
        Self {
            fetcher,
            cache,
            builder,
            options,
        }
    }

    /// The fetcher used for cache misses.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// The archive cache.
    pub fn cache(&self) -> &ArchiveCache {
        &self.cache
    }

    /// Install every dependency declared by `dir/package.json`, recursively.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered; see the module documentation
    /// for which failure that is.
    pub async fn install(&self, dir: &Path) -> Result<InstallStats> {
        self.install_dir(dir.to_path_buf()).await
    }

    fn install_dir(&self, dir: PathBuf) -> BoxFuture<'_, Result<InstallStats>> {
        Box::pin(async move {
            let Some(manifest) = manifest::read_dependencies(&dir).await? else {
                tracing::trace!(target: "npmi::install", "No manifest in {}", dir.display());
                return Ok(InstallStats::default());
            };
            let package = manifest.name.clone().unwrap_or_else(|| dir.display().to_string());
            let dependencies = manifest.into_dependencies();
            if dependencies.is_empty() {
                return Ok(InstallStats::default());
            }

            let modules_dir = dir.join(MODULES_DIR);
            tokio::fs::create_dir_all(&modules_dir).await.map_err(|e| {
                crate::core::NpmiError::Extraction {
                    path: modules_dir.display().to_string(),
                    reason: e.to_string(),
                }
            })?;

            tracing::debug!(
                target: "npmi::install",
                "Resolving {} dependencies of {}",
                dependencies.len(),
                package
            );

            let pending: Vec<_> =
                dependencies.iter().map(|dep| self.plan(dep, &modules_dir)).collect();
            let results: Vec<Result<Planned>> = futures::stream::iter(pending)
                .buffered(self.options.max_parallel.max(1))
                .collect()
                .await;

            // Every fetch has settled; report the first failure in declared order.
            let mut planned = Vec::with_capacity(results.len());
            for (dep, result) in dependencies.iter().zip(results) {
                planned.push((dep, result?));
            }

            let mut stats = InstallStats::default();
            for (dep, plan) in planned {
                match plan {
                    Planned::Skip(state) => {
                        tracing::debug!(target: "npmi::install", "{} is up to date ({:?})", dep, state);
                        stats.skipped += 1;
                    }
                    Planned::Install(entry) => {
                        stats.fetched += 1;
                        stats += self.install_one(dep, &entry, &modules_dir).await?;
                    }
                }
            }

            tracing::debug!(target: "npmi::install", "Finished dependencies of {}: {:?}", package, stats);
            Ok(stats)
        })
    }

    async fn plan(&self, dep: &Dependency, modules_dir: &Path) -> Result<Planned> {
        let destination = modules_dir.join(&dep.name);
        if marker::is_symlink(&destination).await {
            return Ok(Planned::Skip(DestinationState::Symlink));
        }
        if marker::should_skip(&destination, &dep.name, &dep.version_spec).await {
            return Ok(Planned::Skip(DestinationState::Satisfied));
        }

        tracing::debug!(target: "npmi::install", "Fetching {}", dep);
        let entry = self.cache.resolve(&self.fetcher, &dep.name, &dep.version_spec).await?;
        Ok(Planned::Install(entry))
    }

    async fn install_one(
        &self,
        dep: &Dependency,
        entry: &CacheEntry,
        modules_dir: &Path,
    ) -> Result<InstallStats> {
        let destination = modules_dir.join(&dep.name);

        materialize(entry, &destination).await?;
        let mut stats = self.install_dir(destination.clone()).await?;
        if self.builder.build(&destination).await? {
            stats.built += 1;
        }
        marker::write(&destination, &dep.name, &dep.version_spec).await?;
        stats.installed += 1;

        tracing::info!(target: "npmi::install", "Installed {}", dep);
        Ok(stats)
    }
}
