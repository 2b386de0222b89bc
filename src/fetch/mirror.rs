//! Local directory mirror.
//!
//! Serves archives laid out as `<root>/<name>/<spec>.tgz`, so scoped packages
//! naturally nest as `<root>/@scope/name/<spec>.tgz`. Used for offline installs
//! and for exercising the CLI without a network.

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

use super::{ArchiveStream, Fetcher};

const CHUNK_SIZE: usize = 64 * 1024;

/// Fetcher reading tarballs from a local directory.
#[derive(Debug, Clone)]
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    /// Create a mirror rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path at which the archive for `name` at `spec` is expected.
    #[must_use]
    pub fn archive_path(&self, name: &str, spec: &str) -> PathBuf {
        self.root.join(name).join(format!("{spec}.tgz"))
    }
}

impl Fetcher for MirrorFetcher {
    async fn fetch(&self, name: &str, spec: &str) -> Result<ArchiveStream> {
        if name.split('/').any(|part| matches!(part, "" | "." | "..")) || name.contains('\\') {
            return Err(anyhow!("invalid package name '{name}'"));
        }
        if spec.is_empty() || spec.contains(['/', '\\']) || spec.contains("..") {
            return Err(anyhow!("invalid version spec '{spec}' for mirror lookup"));
        }
        let path = self.archive_path(name, spec);

        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("{} is not available in mirror {}", name, self.root.display()))?;

        tracing::debug!(target: "npmi::fetch", "Reading {}", path.display());

        Ok(futures::stream::try_unfold(file, next_chunk).boxed())
    }
}

async fn next_chunk(mut file: tokio::fs::File) -> std::io::Result<Option<(Vec<u8>, tokio::fs::File)>> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let read = file.read(&mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    buf.truncate(read);
    Ok(Some((buf, file)))
}
