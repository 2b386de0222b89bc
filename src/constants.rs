//! Global constants used throughout the npmi codebase.
//!
//! Timeouts, parallelism defaults and the well-known file names that make up
//! the on-disk contract of an installed tree live here so they are easy to find.

use std::time::Duration;

/// Name of the manifest file read in every installable directory.
pub const MANIFEST_FILE: &str = "package.json";

/// Name of the dependency container directory created next to a manifest.
pub const MODULES_DIR: &str = "node_modules";

/// Marker written into every fully installed dependency.
///
/// Its content is exactly `name:versionSpec` with no trailing newline.
pub const MARKER_FILE: &str = ".npmi-install-info";

/// Presence of this file at a package root means a native build is required.
pub const BUILD_DESCRIPTOR_FILE: &str = "binding.gyp";

/// Build tool invoked when no other is configured.
pub const DEFAULT_BUILD_TOOL: &str = "node-gyp";

/// Registry used when neither the config file nor the CLI names one.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Lock file held in the top-level `node_modules` for the duration of an install.
pub const INSTALL_LOCK_FILE: &str = ".npmi.lock";

/// Suffix of persisted archives in the cache directory.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Default timeout for a single archive fetch (120 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for each native build phase (10 minutes).
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(600);

/// Default timeout for acquiring the project install lock (30 seconds).
pub fn default_lock_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Maximum backoff delay for exponential backoff (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Minimum number of parallel fetches regardless of CPU count.
pub const MIN_PARALLELISM: usize = 10;

/// Multiplier applied to CPU core count for default parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default CPU core count when detection fails.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Default per-directory fetch concurrency: `max(10, 2 × cores)`.
pub fn default_max_parallel() -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(FALLBACK_CORE_COUNT);
    (cores * PARALLELISM_CORE_MULTIPLIER).max(MIN_PARALLELISM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_parallel_has_floor() {
        assert!(default_max_parallel() >= MIN_PARALLELISM);
    }
}
