//! Global configuration file.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.npmi/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\npmi\config.toml`
//!
//! The location can be overridden with the `NPMI_CONFIG` environment variable
//! or the `--config` flag. A missing file is not an error; every setting has a
//! default.
//!
//! # File Format
//!
//! ```toml
//! registry = "https://registry.npmjs.org"
//! cache_dir = "~/.cache/npmi"
//! cache_mode = "persistent"        # or "ephemeral"
//! max_parallel = 16
//! fetch_timeout_secs = 120         # 0 disables the timeout
//! build_timeout_secs = 600         # 0 disables the timeout
//! build_tool = "node-gyp"
//! inherit_build_output = false
//! ```
//!
//! # Precedence
//!
//! Defaults, then this file, then environment variables
//! ([`GlobalConfig::apply_env`]), then command-line flags.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use super::{CACHE_DIR_ENV, CONFIG_ENV, REGISTRY_ENV};
use crate::cache::CacheMode;
use crate::constants::{
    DEFAULT_BUILD_TIMEOUT, DEFAULT_BUILD_TOOL, DEFAULT_FETCH_TIMEOUT, DEFAULT_REGISTRY,
    default_max_parallel,
};
use crate::core::NpmiError;

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

fn default_build_tool() -> String {
    DEFAULT_BUILD_TOOL.to_string()
}

const fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

const fn default_build_timeout_secs() -> u64 {
    DEFAULT_BUILD_TIMEOUT.as_secs()
}

const fn secs_to_timeout(secs: u64) -> Option<Duration> {
    if secs == 0 { None } else { Some(Duration::from_secs(secs)) }
}

/// User-wide npmi settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Registry URL, `file://` URL or mirror directory
    #[serde(default = "default_registry")]
    pub registry: String,

    /// Persistent cache directory; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Whether archives are kept between runs
    #[serde(default)]
    pub cache_mode: CacheMode,

    /// Maximum concurrent fetches per directory; CPU-based when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// Per-fetch timeout in seconds, 0 for none
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Per-build-phase timeout in seconds, 0 for none
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,

    /// Native build tool program or path
    #[serde(default = "default_build_tool")]
    pub build_tool: String,

    /// Show build tool output instead of capturing it
    #[serde(default)]
    pub inherit_build_output: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            cache_dir: None,
            cache_mode: CacheMode::default(),
            max_parallel: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            build_timeout_secs: default_build_timeout_secs(),
            build_tool: default_build_tool(),
            inherit_build_output: false,
        }
    }
}

impl GlobalConfig {
    /// Load from the default location, or defaults when the file is absent.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, else from the default location.
    ///
    /// A missing file yields defaults. Environment overrides are applied and
    /// the result is validated.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };

        let mut config = if fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await?
        } else {
            tracing::trace!("No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse the file at `path` without applying environment overrides.
    ///
    /// # Errors
    ///
    /// [`NpmiError::Config`] when the file cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| NpmiError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;

        toml::from_str(&content).map_err(|e| {
            NpmiError::Config {
                message: format!("Failed to parse {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// `NPMI_CONFIG`, or `config.toml` under the npmi home directory.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV)
            && !path.is_empty()
        {
            return Ok(PathBuf::from(shellexpand::tilde(&path).as_ref()));
        }
        Ok(super::get_npmi_dir()?.join("config.toml"))
    }

    /// Apply `NPMI_CACHE_DIR` and `NPMI_REGISTRY`.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV)
            && !dir.is_empty()
        {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Ok(registry) = std::env::var(REGISTRY_ENV)
            && !registry.is_empty()
        {
            self.registry = registry;
        }
    }

    /// Reject settings no install could run with.
    pub fn validate(&self) -> Result<()> {
        if self.registry.trim().is_empty() {
            return Err(NpmiError::Config {
                message: "registry must not be empty".to_string(),
            }
            .into());
        }
        if self.max_parallel == Some(0) {
            return Err(NpmiError::Config {
                message: "max_parallel must be at least 1".to_string(),
            }
            .into());
        }
        if self.build_tool.trim().is_empty() {
            return Err(NpmiError::Config {
                message: "build_tool must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Resolved persistent cache directory.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).as_ref())),
            None => super::get_cache_dir(),
        }
    }

    /// Configured or CPU-based fetch concurrency.
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or_else(default_max_parallel)
    }

    /// Fetch timeout; `None` when disabled.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.fetch_timeout_secs)
    }

    /// Build phase timeout; `None` when disabled.
    #[must_use]
    pub const fn build_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.build_timeout_secs)
    }
}
