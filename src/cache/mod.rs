//! Archive cache.
//!
//! Resolves a `(name, versionSpec)` pair to package contents on local disk.
//! Two modes exist:
//!
//! - **Persistent**: archives are stored as `<dir>/<key>.tar.gz` and reused
//!   by every later run. The cache directory defaults to `~/.npmi/cache/`
//!   (see [`crate::config::get_cache_dir`]).
//! - **Ephemeral**: nothing is reused. Each resolve fetches, unpacks into a
//!   scratch [`TempDir`] and hands back the unpacked directory. Scratch
//!   directories live as long as the [`ArchiveCache`] and are removed when it
//!   is dropped.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.npmi/cache/
//! ├── 3f1c...e9.tar.gz        # sha256(name \0 normalized spec)
//! ├── 8ab0...12.tar.gz
//! └── .locks/
//!     └── 3f1c...e9.lock      # held while the archive above is written
//! ```
//!
//! # Key Normalization
//!
//! A spec of the form `~X.Y.Z` shares its slot with `X.Y.Z`. Other specs are
//! used verbatim, so `^1.2.3` and `1.2.3` occupy different slots even when
//! they resolve to the same version.

pub mod lock;
pub use lock::CacheLock;

use anyhow::Result;
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::archive;
use crate::constants::ARCHIVE_SUFFIX;
use crate::core::NpmiError;
use crate::fetch::Fetcher;

static EXACT_TILDE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^~\d+\.\d+\.\d+$").ok());

/// How archives are retained between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Keep archives in the cache directory
    #[default]
    Persistent,
    /// Fetch every time and discard after the run
    Ephemeral,
}

/// Resolved package contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// A `.tar.gz` archive in the persistent cache
    Archive(PathBuf),
    /// An unpacked archive in a scratch directory, consumed by one install
    Extracted(PathBuf),
}

impl CacheEntry {
    /// Path of the archive or unpacked directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Archive(path) | Self::Extracted(path) => path,
        }
    }
}

/// Strip the tilde from exact `~X.Y.Z` specs.
#[must_use]
pub fn normalize_spec(spec: &str) -> Cow<'_, str> {
    match EXACT_TILDE.as_ref() {
        Some(re) if re.is_match(spec) => Cow::Borrowed(&spec[1..]),
        _ => Cow::Borrowed(spec),
    }
}

/// Cache key for `name` at `spec`: hex SHA-256 of `name`, a NUL byte and the
/// normalized spec.
#[must_use]
pub fn cache_key(name: &str, spec: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_spec(spec).as_bytes());
    hex::encode(hasher.finalize())
}

fn fetch_error(name: &str, spec: &str, reason: impl std::fmt::Display) -> NpmiError {
    NpmiError::Fetch {
        name: name.to_string(),
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
}

fn cache_write_error(path: &Path, reason: impl std::fmt::Display) -> NpmiError {
    NpmiError::CacheWrite {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// The archive cache used by one install run.
pub struct ArchiveCache {
    mode: CacheMode,
    dir: Option<PathBuf>,
    fetch_timeout: Option<Duration>,
    scratch: Mutex<Vec<TempDir>>,
}

impl ArchiveCache {
    /// A persistent cache rooted at `dir`.
    ///
    /// The directory is created on the first miss. `fetch_timeout` bounds each
    /// fetch, including reading the whole archive stream.
    pub fn persistent(dir: impl Into<PathBuf>, fetch_timeout: Option<Duration>) -> Self {
        Self {
            mode: CacheMode::Persistent,
            dir: Some(dir.into()),
            fetch_timeout,
            scratch: Mutex::new(Vec::new()),
        }
    }

    /// An ephemeral cache that never reuses archives.
    pub fn ephemeral(fetch_timeout: Option<Duration>) -> Self {
        Self {
            mode: CacheMode::Ephemeral,
            dir: None,
            fetch_timeout,
            scratch: Mutex::new(Vec::new()),
        }
    }

    /// The cache mode.
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// The persistent cache directory, if any.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Path of the persisted archive for `name` at `spec`.
    #[must_use]
    pub fn archive_path(&self, name: &str, spec: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(format!("{}{ARCHIVE_SUFFIX}", cache_key(name, spec))))
    }

    /// Resolve `name` at `spec` to local contents, fetching through `fetcher`
    /// when needed.
    ///
    /// # Errors
    ///
    /// - [`NpmiError::Fetch`] when the fetcher fails or times out
    /// - [`NpmiError::CacheWrite`] when the archive cannot be stored
    /// - [`NpmiError::Extraction`] when an ephemeral archive cannot be unpacked
    pub async fn resolve<F: Fetcher>(&self, fetcher: &F, name: &str, spec: &str) -> Result<CacheEntry> {
        match &self.dir {
            Some(dir) => self.resolve_persistent(dir, fetcher, name, spec).await,
            None => self.resolve_ephemeral(fetcher, name, spec).await,
        }
    }

    async fn resolve_persistent<F: Fetcher>(
        &self,
        dir: &Path,
        fetcher: &F,
        name: &str,
        spec: &str,
    ) -> Result<CacheEntry> {
        let key = cache_key(name, spec);
        let archive = dir.join(format!("{key}{ARCHIVE_SUFFIX}"));

        if fs::try_exists(&archive).await.unwrap_or(false) {
            tracing::debug!(target: "npmi::cache", "Cache hit for {}@{}", name, spec);
            return Ok(CacheEntry::Archive(archive));
        }

        fs::create_dir_all(dir).await.map_err(|e| cache_write_error(dir, e))?;
        let _lock = CacheLock::acquire(dir, &key).await?;

        // Another writer may have filled the slot while we waited.
        if fs::try_exists(&archive).await.unwrap_or(false) {
            tracing::debug!(target: "npmi::cache", "Cache filled concurrently for {}@{}", name, spec);
            return Ok(CacheEntry::Archive(archive));
        }

        tracing::debug!(target: "npmi::cache", "Cache miss for {}@{}, fetching", name, spec);

        let part = dir.join(format!("{key}{ARCHIVE_SUFFIX}.{}.part", uuid::Uuid::new_v4()));
        self.download(fetcher, name, spec, &part).await?;

        if let Err(e) = fs::rename(&part, &archive).await {
            let _ = fs::remove_file(&part).await;
            return Err(cache_write_error(&archive, e).into());
        }

        Ok(CacheEntry::Archive(archive))
    }

    async fn resolve_ephemeral<F: Fetcher>(
        &self,
        fetcher: &F,
        name: &str,
        spec: &str,
    ) -> Result<CacheEntry> {
        let scratch = tempfile::Builder::new()
            .prefix("npmi-")
            .tempdir()
            .map_err(|e| cache_write_error(&std::env::temp_dir(), e))?;

        let archive = scratch.path().join(format!("archive{ARCHIVE_SUFFIX}"));
        let payload = scratch.path().join("payload");
        self.download(fetcher, name, spec, &archive).await?;

        let (from, into) = (archive.clone(), payload.clone());
        tokio::task::spawn_blocking(move || archive::unpack_archive(&from, &into))
            .await
            .map_err(|e| NpmiError::Extraction {
                path: archive.display().to_string(),
                reason: e.to_string(),
            })??;
        let _ = fs::remove_file(&archive).await;

        tracing::debug!(
            target: "npmi::cache",
            "Unpacked {}@{} into {}",
            name,
            spec,
            payload.display()
        );

        self.scratch.lock().unwrap_or_else(PoisonError::into_inner).push(scratch);
        Ok(CacheEntry::Extracted(payload))
    }

    /// Stream the archive for `name` at `spec` into `target`.
    ///
    /// `target` is removed again on any failure.
    async fn download<F: Fetcher>(
        &self,
        fetcher: &F,
        name: &str,
        spec: &str,
        target: &Path,
    ) -> Result<()> {
        let transfer = async {
            let mut stream =
                fetcher.fetch(name, spec).await.map_err(|e| fetch_error(name, spec, format!("{e:#}")))?;
            let mut file = fs::File::create(target).await.map_err(|e| cache_write_error(target, e))?;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| fetch_error(name, spec, e))?;
                file.write_all(&chunk).await.map_err(|e| cache_write_error(target, e))?;
            }

            file.flush().await.map_err(|e| cache_write_error(target, e))?;
            file.sync_all().await.map_err(|e| cache_write_error(target, e))?;
            Ok::<(), NpmiError>(())
        };

        let result = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, transfer).await.unwrap_or_else(|_| {
                Err(fetch_error(name, spec, format!("timed out after {}s", limit.as_secs_f32())))
            }),
            None => transfer.await,
        };

        if let Err(e) = result {
            let _ = fs::remove_file(target).await;
            tracing::debug!(target: "npmi::cache", "Fetch of {}@{} failed: {}", name, spec, e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove every persisted archive and the lock directory.
    ///
    /// Returns the number of archives removed. An ephemeral cache has nothing
    /// to clean and returns 0.
    pub async fn clean(&self) -> Result<usize> {
        let Some(dir) = &self.dir else {
            return Ok(0);
        };
        if !fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(0);
        }

        let mut removed = 0;
        let mut entries = fs::read_dir(dir).await.map_err(|e| cache_write_error(dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| cache_write_error(dir, e))? {
            let path = entry.path();
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.ends_with(ARCHIVE_SUFFIX) || file_name.ends_with(".part") {
                fs::remove_file(&path).await.map_err(|e| cache_write_error(&path, e))?;
                removed += 1;
            }
        }

        let locks = dir.join(".locks");
        if fs::try_exists(&locks).await.unwrap_or(false) {
            fs::remove_dir_all(&locks).await.map_err(|e| cache_write_error(&locks, e))?;
        }

        tracing::info!(target: "npmi::cache", "Removed {} cached archives from {}", removed, dir.display());
        Ok(removed)
    }
}

impl std::fmt::Debug for ArchiveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCache")
            .field("mode", &self.mode)
            .field("dir", &self.dir)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{FakeFetcher, TarballBuilder};

    #[test]
    fn test_normalize_spec() {
        assert_eq!(normalize_spec("~1.2.3"), "1.2.3");
        assert_eq!(normalize_spec("1.2.3"), "1.2.3");
        assert_eq!(normalize_spec("~1.2"), "~1.2");
        assert_eq!(normalize_spec("^1.2.3"), "^1.2.3");
        assert_eq!(normalize_spec("~1.2.3-beta.1"), "~1.2.3-beta.1");
        assert_eq!(normalize_spec(" ~1.2.3"), " ~1.2.3");
    }

    #[test]
    fn test_cache_key_normalization() {
        assert_eq!(cache_key("a", "~1.2.3"), cache_key("a", "1.2.3"));
        assert_ne!(cache_key("a", "^1.2.3"), cache_key("a", "1.2.3"));
        assert_ne!(cache_key("a", "1.2.3"), cache_key("b", "1.2.3"));
        // The separator keeps name/spec boundaries distinct.
        assert_ne!(cache_key("ab", "c"), cache_key("a", "bc"));
        assert_eq!(cache_key("a", "1.0.0").len(), 64);
    }

    #[tokio::test]
    async fn test_persistent_hit_avoids_fetcher() {
        let temp = tempfile::TempDir::new().unwrap();
        let fetcher = FakeFetcher::new().with_package("a", "~1.2.3", &TarballBuilder::package("a", "1.2.3"));
        let cache = ArchiveCache::persistent(temp.path(), None);

        let first = cache.resolve(&fetcher, "a", "~1.2.3").await.unwrap();
        assert!(matches!(first, CacheEntry::Archive(_)));
        assert!(first.path().exists());
        assert_eq!(fetcher.fetch_count(), 1);

        // "1.2.3" normalizes to the same slot and is served without fetching.
        let second = cache.resolve(&fetcher, "a", "1.2.3").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_leaves_no_archive() {
        let temp = tempfile::TempDir::new().unwrap();
        let fetcher = FakeFetcher::new().with_failure("a");
        let cache = ArchiveCache::persistent(temp.path(), None);

        let err = cache.resolve(&fetcher, "a", "1.0.0").await.unwrap_err();
        match err.downcast_ref::<NpmiError>() {
            Some(NpmiError::Fetch { name, spec, reason }) => {
                assert_eq!(name, "a");
                assert_eq!(spec, "1.0.0");
                assert!(reason.contains("simulated"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_lock_failure_is_cache_write_error() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join(".locks"), "in the way").unwrap();
        let fetcher = FakeFetcher::new().with_package("a", "1.0.0", &TarballBuilder::package("a", "1.0.0"));
        let cache = ArchiveCache::persistent(temp.path(), None);

        let err = cache.resolve(&fetcher, "a", "1.0.0").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<NpmiError>(), Some(NpmiError::CacheWrite { .. })));
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_timeout_maps_to_fetch_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let fetcher = FakeFetcher::new()
            .with_package("slow", "1.0.0", &TarballBuilder::package("slow", "1.0.0"))
            .with_delay("slow", Duration::from_millis(500));
        let cache = ArchiveCache::persistent(temp.path(), Some(Duration::from_millis(20)));

        let err = cache.resolve(&fetcher, "slow", "1.0.0").await.unwrap_err();
        match err.downcast_ref::<NpmiError>() {
            Some(NpmiError::Fetch { reason, .. }) => assert!(reason.contains("timed out")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!cache.archive_path("slow", "1.0.0").unwrap().exists());
    }

    #[tokio::test]
    async fn test_ephemeral_never_hits_and_cleans_up_on_drop() {
        let fetcher = FakeFetcher::new().with_package("a", "1.0.0", &TarballBuilder::package("a", "1.0.0"));
        let cache = ArchiveCache::ephemeral(None);

        let first = cache.resolve(&fetcher, "a", "1.0.0").await.unwrap();
        let second = cache.resolve(&fetcher, "a", "1.0.0").await.unwrap();
        assert_eq!(fetcher.fetch_count(), 2);
        assert_ne!(first, second);

        let CacheEntry::Extracted(payload) = &first else {
            panic!("expected extracted entry, got {first:?}");
        };
        assert!(payload.join("package").join("package.json").exists());

        drop(cache);
        assert!(!first.path().exists());
        assert!(!second.path().exists());
    }

    #[tokio::test]
    async fn test_ephemeral_corrupt_archive_is_extraction_error() {
        struct Garbage;
        impl Fetcher for Garbage {
            async fn fetch(&self, _: &str, _: &str) -> Result<crate::fetch::ArchiveStream> {
                Ok(futures::stream::iter(vec![Ok(vec![0x1f, 0x8b, 0xff, 0x00])]).boxed())
            }
        }

        let cache = ArchiveCache::ephemeral(None);
        let err = cache.resolve(&Garbage, "a", "1.0.0").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<NpmiError>(), Some(NpmiError::Extraction { .. })));
    }

    #[tokio::test]
    async fn test_clean_removes_archives_and_locks() {
        let temp = tempfile::TempDir::new().unwrap();
        let fetcher = FakeFetcher::new()
            .with_package("a", "1.0.0", &TarballBuilder::package("a", "1.0.0"))
            .with_package("b", "2.0.0", &TarballBuilder::package("b", "2.0.0"));
        let cache = ArchiveCache::persistent(temp.path(), None);
        cache.resolve(&fetcher, "a", "1.0.0").await.unwrap();
        cache.resolve(&fetcher, "b", "2.0.0").await.unwrap();

        assert_eq!(cache.clean().await.unwrap(), 2);
        assert!(!temp.path().join(".locks").exists());
        assert!(!cache.archive_path("a", "1.0.0").unwrap().exists());

        assert_eq!(ArchiveCache::ephemeral(None).clean().await.unwrap(), 0);
    }
}
