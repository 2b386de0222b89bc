//! Idempotency marker.
//!
//! A fully installed dependency carries a `.npmi-install-info` file whose
//! content is exactly `name:versionSpec`. A later run that requests the same
//! key leaves the directory alone.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

use crate::constants::MARKER_FILE;

/// What currently occupies a dependency's destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationState {
    /// Nothing there
    Missing,
    /// A symlink (e.g. `npm link`); never touched
    Symlink,
    /// Installed with the requested name and spec
    Satisfied,
    /// Something else: no marker, a different spec, or a non-directory
    Stale,
}

/// Marker content for `name` at `spec`.
#[must_use]
pub fn installed_key(name: &str, spec: &str) -> String {
    format!("{name}:{spec}")
}

/// Classify `destination` for `name` at `spec`.
pub async fn inspect(destination: &Path, name: &str, spec: &str) -> DestinationState {
    let metadata = match fs::symlink_metadata(destination).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return DestinationState::Missing,
        Err(_) => return DestinationState::Stale,
    };

    if metadata.file_type().is_symlink() {
        return DestinationState::Symlink;
    }
    if !metadata.is_dir() {
        return DestinationState::Stale;
    }

    match fs::read_to_string(destination.join(MARKER_FILE)).await {
        Ok(content) if content == installed_key(name, spec) => DestinationState::Satisfied,
        _ => DestinationState::Stale,
    }
}

/// Whether `destination` is a symlink, which the installer leaves alone.
pub async fn is_symlink(destination: &Path) -> bool {
    fs::symlink_metadata(destination).await.is_ok_and(|m| m.file_type().is_symlink())
}

/// `true` only when `destination` holds a marker for exactly `name:spec`.
pub async fn should_skip(destination: &Path, name: &str, spec: &str) -> bool {
    inspect(destination, name, spec).await == DestinationState::Satisfied
}

/// Record that `destination` holds a complete install of `name` at `spec`.
///
/// Written to a temporary file and renamed so the marker is never partial.
pub async fn write(destination: &Path, name: &str, spec: &str) -> Result<()> {
    let marker = destination.join(MARKER_FILE);
    let temp = destination.join(format!("{MARKER_FILE}.tmp"));

    fs::write(&temp, installed_key(name, spec))
        .await
        .with_context(|| format!("Failed to write install marker: {}", temp.display()))?;
    fs::rename(&temp, &marker)
        .await
        .with_context(|| format!("Failed to write install marker: {}", marker.display()))?;

    tracing::trace!(target: "npmi::install", "Marked {} as {}:{}", destination.display(), name, spec);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inspect_states() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a");
        assert_eq!(inspect(&dest, "a", "1.0.0").await, DestinationState::Missing);

        std::fs::create_dir(&dest).unwrap();
        assert_eq!(inspect(&dest, "a", "1.0.0").await, DestinationState::Stale);

        write(&dest, "a", "1.0.0").await.unwrap();
        assert_eq!(inspect(&dest, "a", "1.0.0").await, DestinationState::Satisfied);
        assert_eq!(inspect(&dest, "a", "^1.0.0").await, DestinationState::Stale);
        assert!(should_skip(&dest, "a", "1.0.0").await);
        assert!(!should_skip(&dest, "a", "2.0.0").await);
    }

    #[tokio::test]
    async fn test_marker_content_is_exact() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "@scope/pkg", "~1.2.3").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(temp.path().join(MARKER_FILE)).unwrap(),
            "@scope/pkg:~1.2.3"
        );
        assert!(!temp.path().join(format!("{MARKER_FILE}.tmp")).exists());
    }

    #[tokio::test]
    async fn test_marker_with_trailing_newline_is_stale() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(MARKER_FILE), "a:1.0.0\n").unwrap();
        assert_eq!(inspect(temp.path(), "a", "1.0.0").await, DestinationState::Stale);
    }

    #[tokio::test]
    async fn test_regular_file_is_stale() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a");
        std::fs::write(&dest, "not a package").unwrap();
        assert_eq!(inspect(&dest, "a", "1.0.0").await, DestinationState::Stale);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_is_detected() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("real");
        std::fs::create_dir(&target).unwrap();
        let dest = temp.path().join("a");
        std::os::unix::fs::symlink(&target, &dest).unwrap();

        let state = inspect(&dest, "a", "1.0.0").await;
        assert_eq!(state, DestinationState::Symlink);
        assert!(is_symlink(&dest).await);
        assert!(!is_symlink(&target).await);
        assert!(!should_skip(&dest, "a", "1.0.0").await);
    }
}
