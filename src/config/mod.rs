//! Configuration for npmi.
//!
//! npmi has no project-level configuration beyond `package.json`. User-wide
//! settings live in `~/.npmi/config.toml` ([`GlobalConfig`]); see that type for
//! the file format and for how settings from the file, the environment and
//! the command line are layered.
//!
//! # Environment Variables
//!
//! - `NPMI_CONFIG` - path of the config file
//! - `NPMI_CACHE_DIR` - persistent archive cache directory
//! - `NPMI_REGISTRY` - registry URL or mirror directory

mod global;

pub use global::GlobalConfig;

use anyhow::Result;
use std::path::PathBuf;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "NPMI_CONFIG";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "NPMI_CACHE_DIR";

/// Environment variable overriding the registry.
pub const REGISTRY_ENV: &str = "NPMI_REGISTRY";

/// Get the npmi home directory.
///
/// - Windows: `%LOCALAPPDATA%\npmi`
/// - macOS/Linux: `~/.npmi`
///
/// # Errors
///
/// Returns an error if the home (or local data) directory cannot be determined.
pub fn get_npmi_dir() -> Result<PathBuf> {
    let dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
            .join("npmi")
    } else {
        dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".npmi")
    };
    Ok(dir)
}

/// Get the persistent archive cache directory.
///
/// # Location Priority
///
/// 1. `NPMI_CACHE_DIR` environment variable (if set)
/// 2. `cache/` under [`get_npmi_dir`]
///
/// The directory is not created here; the cache creates it on first write.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn get_cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(shellexpand::tilde(&dir).as_ref()));
    }

    Ok(get_npmi_dir()?.join("cache"))
}
