//! Archive fetchers.
//!
//! The installer never talks to the network directly. It asks a [`Fetcher`]
//! for the archive bytes of a `(name, versionSpec)` pair and leaves specifier
//! interpretation entirely to it. Two implementations ship with npmi:
//!
//! - [`RegistryFetcher`] - npm-style HTTP registry via `reqwest`
//! - [`MirrorFetcher`] - a local directory of `<name>/<spec>.tgz` files
//!
//! [`SourceFetcher`] picks one of them from the configured registry string.

mod mirror;
mod registry;

pub use mirror::MirrorFetcher;
pub use registry::{Packument, RegistryFetcher, select_version};

use anyhow::Result;
use futures::stream::BoxStream;
use std::future::Future;
use std::path::PathBuf;

/// A stream of (usually gzip-compressed tar) archive bytes.
pub type ArchiveStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// Resolves a dependency to a readable archive stream.
///
/// Implementations may fail asynchronously; the archive cache turns any
/// failure into [`NpmiError::Fetch`](crate::core::NpmiError::Fetch).
pub trait Fetcher: Send + Sync {
    /// Start fetching the archive for `name` at `spec`.
    fn fetch(&self, name: &str, spec: &str) -> impl Future<Output = Result<ArchiveStream>> + Send;
}

/// The fetcher selected by the `registry` setting.
pub enum SourceFetcher {
    /// HTTP(S) registry
    Registry(RegistryFetcher),
    /// Local tarball mirror
    Mirror(MirrorFetcher),
}

impl SourceFetcher {
    /// Choose a fetcher for `registry`.
    ///
    /// `file://` URLs and paths to existing directories select a
    /// [`MirrorFetcher`]; everything else is treated as an HTTP registry URL.
    pub fn from_registry(registry: &str) -> Result<Self> {
        if let Some(path) = registry.strip_prefix("file://") {
            return Ok(Self::Mirror(MirrorFetcher::new(PathBuf::from(path))));
        }

        if !registry.contains("://") {
            let path = PathBuf::from(shellexpand::tilde(registry).as_ref());
            if path.is_dir() {
                return Ok(Self::Mirror(MirrorFetcher::new(path)));
            }
        }

        Ok(Self::Registry(RegistryFetcher::new(registry)?))
    }
}

impl Fetcher for SourceFetcher {
    async fn fetch(&self, name: &str, spec: &str) -> Result<ArchiveStream> {
        match self {
            Self::Registry(fetcher) => fetcher.fetch(name, spec).await,
            Self::Mirror(fetcher) => fetcher.fetch(name, spec).await,
        }
    }
}
