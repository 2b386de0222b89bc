//! Replace a dependency's destination with the contents of its archive.
//!
//! Package archives wrap their files in a single top-level directory
//! (`package/` for registry tarballs). The wrapper is unpacked into a staging
//! directory next to the destination, validated, and then renamed onto the
//! destination. The destination is only touched once a complete and valid
//! extraction exists.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::cache::CacheEntry;
use crate::core::NpmiError;

fn extraction_error(path: &Path, reason: impl std::fmt::Display) -> NpmiError {
    NpmiError::Extraction {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Install `source` at `destination`, replacing whatever directory is there.
///
/// The caller is responsible for never passing a symlinked destination.
///
/// # Errors
///
/// - [`NpmiError::UnexpectedArchiveLayout`] when the archive does not hold
///   exactly one top-level directory
/// - [`NpmiError::Extraction`] for unpack or filesystem failures
///
/// In both cases the destination is left as it was.
pub async fn materialize(source: &CacheEntry, destination: &Path) -> Result<()> {
    let source = source.clone();
    let destination = destination.to_path_buf();
    let target = destination.clone();

    tokio::task::spawn_blocking(move || materialize_blocking(&source, &target))
        .await
        .map_err(|e| extraction_error(&destination, e))?
}

fn materialize_blocking(source: &CacheEntry, destination: &Path) -> Result<()> {
    let (container, name) = match (destination.parent(), destination.file_name()) {
        (Some(container), Some(name)) => (container, name.to_string_lossy()),
        _ => return Err(extraction_error(destination, "destination has no parent directory").into()),
    };
    fs::create_dir_all(container).map_err(|e| extraction_error(container, e))?;

    let staging = container.join(format!(".{name}.staging-{}", uuid::Uuid::new_v4()));
    let result = stage_and_swap(source, &staging, destination);

    if staging.exists()
        && let Err(e) = fs::remove_dir_all(&staging)
    {
        tracing::warn!(target: "npmi::install", "Failed to remove {}: {}", staging.display(), e);
    }
    result
}

fn stage_and_swap(source: &CacheEntry, staging: &Path, destination: &Path) -> Result<()> {
    match source {
        CacheEntry::Archive(archive) => {
            tracing::debug!(
                target: "npmi::install",
                "Unpacking {} into {}",
                archive.display(),
                destination.display()
            );
            archive::unpack_archive(archive, staging)?;
        }
        CacheEntry::Extracted(payload) => {
            if fs::rename(payload, staging).is_err() {
                // Scratch space may live on another filesystem.
                archive::copy_tree(payload, staging).map_err(|e| extraction_error(staging, e))?;
            }
        }
    }

    let wrapper = single_wrapper_dir(staging, destination)?;

    match fs::symlink_metadata(destination) {
        Ok(metadata) if metadata.is_dir() => {
            fs::remove_dir_all(destination).map_err(|e| extraction_error(destination, e))?;
        }
        Ok(_) => fs::remove_file(destination).map_err(|e| extraction_error(destination, e))?,
        Err(_) => {}
    }

    fs::rename(&wrapper, destination).map_err(|e| extraction_error(destination, e))?;
    Ok(())
}

fn single_wrapper_dir(staging: &Path, destination: &Path) -> Result<PathBuf> {
    let entries = archive::top_level_entries(staging).map_err(|e| extraction_error(staging, e))?;

    // A symlinked wrapper would point the install somewhere outside the tree.
    let is_real_dir = |path: &Path| fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_dir());

    match entries.as_slice() {
        [only] if is_real_dir(only.as_path()) => Ok(only.clone()),
        _ => Err(NpmiError::UnexpectedArchiveLayout {
            path: destination.display().to_string(),
            entries: entries.len(),
        }
        .into()),
    }
}
