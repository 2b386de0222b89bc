//! Gzip/tar primitives shared by the archive cache and the materializer.
//!
//! Everything here is synchronous and is meant to run on
//! `tokio::task::spawn_blocking`.

use anyhow::Result;
use flate2::read::GzDecoder;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::NpmiError;

/// Gzip magic bytes; archives without them are unpacked as plain tar.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn extraction_error(path: &Path, reason: impl std::fmt::Display) -> NpmiError {
    NpmiError::Extraction {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Unpack the (optionally gzip-compressed) tar archive at `archive` into `into`.
///
/// `into` is created if needed. Entries that would escape `into` are
/// rejected by `tar::Archive::unpack`.
///
/// # Errors
///
/// Returns [`NpmiError::Extraction`] for unreadable, corrupt or unsafe archives.
pub fn unpack_archive(archive: &Path, into: &Path) -> Result<()> {
    fs::create_dir_all(into).map_err(|e| extraction_error(into, e))?;

    let mut file = fs::File::open(archive).map_err(|e| extraction_error(archive, e))?;
    let mut magic = [0u8; 2];
    let is_gzip = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    let file = fs::File::open(archive).map_err(|e| extraction_error(archive, e))?;
    let reader = BufReader::new(file);

    let result = if is_gzip {
        tar::Archive::new(GzDecoder::new(reader)).unpack(into)
    } else {
        tar::Archive::new(reader).unpack(into)
    };

    result.map_err(|e| extraction_error(archive, e).into())
}

/// List the top-level entries of `dir`.
pub fn top_level_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    fs::read_dir(dir)?.map(|entry| entry.map(|e| e.path())).collect()
}

/// Recursively copy `src` into `dst`, recreating symlinks on Unix.
///
/// Used when a payload cannot be renamed into place because it lives on a
/// different filesystem.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry.path().strip_prefix(src).map_err(std::io::Error::other)?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
            #[cfg(not(unix))]
            fs::copy(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::TarballBuilder;
    use tempfile::TempDir;

    #[test]
    fn test_unpack_gzip_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("a.tgz");
        TarballBuilder::package("a", "1.0.0").write_to(&archive).unwrap();

        let out = temp.path().join("out");
        unpack_archive(&archive, &out).unwrap();

        let entries = top_level_entries(&out).unwrap();
        assert_eq!(entries, vec![out.join("package")]);
        assert!(out.join("package").join("package.json").exists());
    }

    #[test]
    fn test_unpack_plain_tar() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("a.tar");
        std::fs::write(&archive, TarballBuilder::package("a", "1.0.0").tar_bytes().unwrap())
            .unwrap();

        let out = temp.path().join("out");
        unpack_archive(&archive, &out).unwrap();
        assert!(out.join("package").join("package.json").exists());
    }

    #[test]
    fn test_unpack_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.tgz");
        std::fs::write(&archive, [0x1f, 0x8b, 0x00, 0x01, 0x02]).unwrap();

        let err = unpack_archive(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NpmiError>(),
            Some(NpmiError::Extraction { .. })
        ));
    }

    #[test]
    fn test_copy_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("lib")).unwrap();
        std::fs::write(src.join("lib").join("index.js"), "x").unwrap();

        let dst = temp.path().join("dst");
        copy_tree(&src, &dst).unwrap();
        assert_eq!(std::fs::read_to_string(dst.join("lib").join("index.js")).unwrap(), "x");
    }
}
