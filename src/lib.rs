//! npmi - a recursive `package.json` dependency installer
//!
//! Given a project whose `package.json` declares dependencies, npmi fetches
//! each dependency's archive, unpacks it into `node_modules/<name>`, installs
//! that package's own dependencies the same way, runs a native build when the
//! package ships a `binding.gyp`, and finally records an install marker so the
//! next run can skip it.
//!
//! # Architecture Overview
//!
//! ```text
//! cli ──► installer ──► manifest        (what to install)
//!            │
//!            ├────────► cache ──► fetch (archives, concurrently per directory)
//!            ├────────► installer::materialize (unpack, strictly in order)
//!            ├────────► installer (recurse into the package)
//!            ├────────► build      (node-gyp configure && build)
//!            └────────► installer::marker (record success)
//! ```
//!
//! # Core Modules
//!
//! - [`installer`] - the recursive install driver, marker and materializer
//! - [`cache`] - persistent and ephemeral archive caches
//! - [`fetch`] - the [`Fetcher`](fetch::Fetcher) seam with registry and mirror implementations
//! - [`build`] - native addon builds
//! - [`manifest`] - `package.json` reading
//! - [`archive`] - gzip/tar helpers
//!
//! ## Supporting Modules
//! - [`cli`] - command-line interface
//! - [`config`] - `~/.npmi/config.toml` and environment overrides
//! - [`core`] - shared types and the [`NpmiError`](core::NpmiError) taxonomy
//! - [`constants`] - file names, defaults and timeouts
//!
//! # Example
//!
//! ```rust,no_run
//! use npmi_cli::build::BuildRunner;
//! use npmi_cli::cache::ArchiveCache;
//! use npmi_cli::fetch::SourceFetcher;
//! use npmi_cli::installer::{InstallOptions, Installer};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let installer = Installer::new(
//!     SourceFetcher::from_registry("https://registry.npmjs.org")?,
//!     ArchiveCache::persistent(npmi_cli::config::get_cache_dir()?, None),
//!     BuildRunner::default(),
//!     InstallOptions::default(),
//! );
//! let stats = installer.install(Path::new(".")).await?;
//! println!("{} packages installed", stats.installed);
//! # Ok(())
//! # }
//! ```

// Install pipeline
pub mod archive;
pub mod build;
pub mod cache;
pub mod fetch;
pub mod installer;
pub mod manifest;

// Supporting modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
