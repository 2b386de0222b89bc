//! File locking for archive cache writes.
//!
//! Every cache miss takes an exclusive lock on `{cache_dir}/.locks/{key}.lock`
//! before fetching, so two installs (in one process or in different ones)
//! never write the same archive at the same time. The lock is released when
//! the [`CacheLock`] is dropped.

use anyhow::Result;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::core::NpmiError;

fn lock_error(path: &Path, reason: impl std::fmt::Display) -> NpmiError {
    NpmiError::CacheWrite {
        path: path.display().to_string(),
        reason: format!("cannot lock: {reason}"),
    }
}

/// An exclusive lock on one cache key.
pub struct CacheLock {
    _file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Acquires an exclusive lock for `key` in the cache directory.
    ///
    /// The blocking `lock_exclusive` call runs on `spawn_blocking` so waiting
    /// for another writer never stalls the tokio runtime. There is no timeout:
    /// the holder is an in-flight fetch which is itself bounded by the fetch
    /// timeout.
    ///
    /// # Errors
    ///
    /// [`NpmiError::CacheWrite`] if the `.locks/` directory or the lock file
    /// cannot be created, or if the filesystem does not support locking.
    pub async fn acquire(cache_dir: &Path, key: &str) -> Result<Self> {
        let locks_dir = cache_dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir).await.map_err(|e| lock_error(&locks_dir, e))?;

        let lock_path = locks_dir.join(format!("{key}.lock"));
        let open_path = lock_path.clone();

        let file = tokio::task::spawn_blocking(move || -> Result<File, NpmiError> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&open_path)
                .map_err(|e| lock_error(&open_path, e))?;

            file.lock_exclusive().map_err(|e| lock_error(&open_path, e))?;
            Ok(file)
        })
        .await
        .map_err(|e| lock_error(&lock_path, e))??;

        tracing::trace!(target: "npmi::cache", "Acquired cache lock {}", lock_path.display());

        Ok(Self {
            _file: file,
            path: lock_path,
        })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self._file.unlock() {
            tracing::warn!(target: "npmi::cache", "Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
