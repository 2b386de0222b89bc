//! Tree-level install lock.
//!
//! Two `npmi install` runs on the same project would race on the same
//! `node_modules` directories. The CLI takes an exclusive lock on
//! `<root>/node_modules/.npmi.lock` for the whole run. Dropping the
//! [`InstallLock`] releases the lock but leaves the file in place, so every
//! waiter contends on the same inode.
//!
//! All file operations run on `spawn_blocking` so that waiting for the lock
//! never stalls the tokio runtime.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

use crate::constants::{
    INSTALL_LOCK_FILE, MAX_BACKOFF_DELAY_MS, MODULES_DIR, STARTING_BACKOFF_DELAY_MS,
    default_lock_timeout,
};
use crate::core::NpmiError;

/// Exclusive lock on a project's `node_modules` tree.
#[derive(Debug)]
pub struct InstallLock {
    _file: Arc<File>,
    lock_path: PathBuf,
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self._file.unlock() {
            debug!(target: "npmi::install", error = %e, "Failed to unlock install lock");
        }
        debug!(target: "npmi::install", path = %self.lock_path.display(), "Install lock released");
    }
}

impl InstallLock {
    /// Lock the tree rooted at `project_dir`, waiting up to the default lock timeout.
    pub async fn acquire(project_dir: &Path) -> Result<Self> {
        Self::acquire_with_timeout(project_dir, default_lock_timeout()).await
    }

    /// Lock the tree rooted at `project_dir`, waiting up to `timeout`.
    ///
    /// Polls with exponential backoff (10ms doubling up to 500ms).
    ///
    /// # Errors
    ///
    /// [`NpmiError::InstallLocked`] when another process holds the lock for
    /// longer than `timeout`; an I/O error when the lock file cannot be created.
    pub async fn acquire_with_timeout(project_dir: &Path, timeout: Duration) -> Result<Self> {
        let modules_dir = project_dir.join(MODULES_DIR);
        tokio::fs::create_dir_all(&modules_dir)
            .await
            .with_context(|| format!("Failed to create {}", modules_dir.display()))?;

        let lock_path = modules_dir.join(INSTALL_LOCK_FILE);
        debug!(target: "npmi::install", path = %lock_path.display(), "Waiting for install lock");

        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .with_context(|| "spawn_blocking panicked")?
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        let file = Arc::new(file);

        let start = std::time::Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            let candidate = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || candidate.try_lock_exclusive())
                .await
                .with_context(|| "spawn_blocking panicked")?;

            if let Ok(true) = locked {
                debug!(
                    target: "npmi::install",
                    wait_ms = start.elapsed().as_millis(),
                    "Install lock acquired"
                );
                return Ok(Self {
                    _file: file,
                    lock_path,
                });
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }

        Err(NpmiError::InstallLocked {
            path: project_dir.display().to_string(),
        }
        .into())
    }
}
