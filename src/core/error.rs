//! Error handling for npmi
//!
//! This module provides the typed error taxonomy of the installer and the
//! user-facing rendering of the single error an install run can end with.
//!
//! # Architecture
//!
//! - [`NpmiError`] - Enumerated error types for every fatal install failure
//! - [`ErrorContext`] - Wrapper that adds details and an actionable suggestion
//!
//! Functions throughout the crate return [`anyhow::Result`]. Typed failures are
//! raised as [`NpmiError`] values converted into [`anyhow::Error`], so callers
//! can recover the exact kind with `downcast_ref::<NpmiError>()`.
//!
//! # Propagation
//!
//! Install errors are terminal to the operation they occur in and are never
//! retried here. The orchestrator propagates the first cause upward through the
//! recursion without wrapping it, so the top-level caller receives exactly the
//! error that stopped the run.
//!
//! # Examples
//!
//! ```rust,no_run
//! use npmi_cli::core::{NpmiError, user_friendly_error};
//!
//! let error = NpmiError::Fetch {
//!     name: "left-pad".to_string(),
//!     spec: "1.3.0".to_string(),
//!     reason: "HTTP 404".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for npmi operations.
///
/// # Error Categories
///
/// ## Manifest
/// - [`ManifestRead`](NpmiError::ManifestRead) - `package.json` exists but cannot be read
/// - [`ManifestParse`](NpmiError::ManifestParse) - `package.json` is not valid JSON or has a malformed `dependencies` map
///
/// ## Fetch and cache
/// - [`Fetch`](NpmiError::Fetch) - the registry or mirror could not deliver the archive
/// - [`CacheWrite`](NpmiError::CacheWrite) - the archive could not be stored locally
///
/// ## Materialization
/// - [`UnexpectedArchiveLayout`](NpmiError::UnexpectedArchiveLayout) - the archive does not hold exactly one top-level directory
/// - [`Extraction`](NpmiError::Extraction) - decompression, unpacking or moving files failed
///
/// ## Native build
/// - [`BuildConfigure`](NpmiError::BuildConfigure) - the `configure` phase exited non-zero
/// - [`BuildFailed`](NpmiError::BuildFailed) - the `build` phase exited non-zero
///
/// ## Environment
/// - [`Config`](NpmiError::Config) - the global configuration is invalid
/// - [`InstallLocked`](NpmiError::InstallLocked) - another install holds the tree
#[derive(Error, Debug, Clone)]
pub enum NpmiError {
    /// The manifest file exists but could not be read.
    #[error("Failed to read manifest {path}: {reason}")]
    ManifestRead {
        /// Path of the manifest file
        path: String,
        /// Underlying I/O failure
        reason: String,
    },

    /// The manifest content is not valid structured data.
    #[error("Invalid manifest {path}: {reason}")]
    ManifestParse {
        /// Path of the manifest file
        path: String,
        /// Parser message
        reason: String,
    },

    /// Fetching the archive for a dependency failed.
    #[error("Failed to fetch {name}@{spec}: {reason}")]
    Fetch {
        /// Dependency name
        name: String,
        /// Requested version specifier
        spec: String,
        /// Network, registry or timeout failure
        reason: String,
    },

    /// Writing a fetched archive or payload to local disk failed.
    #[error("Failed to write cache entry {path}: {reason}")]
    CacheWrite {
        /// Cache file or directory being written
        path: String,
        /// Underlying I/O failure
        reason: String,
    },

    /// The archive did not contain exactly one top-level directory.
    #[error("Unexpected archive layout for {path}: expected one top-level directory, found {entries}")]
    UnexpectedArchiveLayout {
        /// Destination the archive was being installed into
        path: String,
        /// Number of top-level entries found
        entries: usize,
    },

    /// Unpacking the archive into its destination failed.
    #[error("Failed to extract into {path}: {reason}")]
    Extraction {
        /// Destination or staging path
        path: String,
        /// Decompression, tar or filesystem failure
        reason: String,
    },

    /// The `configure` phase of the native build failed.
    #[error("Could not configure native build in {path}")]
    BuildConfigure {
        /// Package root the build ran in
        path: String,
        /// Exit code, `None` when killed, timed out or never started
        status: Option<i32>,
        /// Captured standard error or failure reason
        stderr: String,
    },

    /// The `build` phase of the native build failed.
    #[error("Could not build native addon in {path}")]
    BuildFailed {
        /// Package root the build ran in
        path: String,
        /// Exit code, `None` when killed, timed out or never started
        status: Option<i32>,
        /// Captured standard error or failure reason
        stderr: String,
    },

    /// The global configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Another npmi process is installing into the same tree.
    #[error("Another install is running in {path}")]
    InstallLocked {
        /// Directory holding the install lock
        path: String,
    },
}

impl NpmiError {
    /// Short machine-friendly name of the variant, used in log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ManifestRead { .. } => "manifest-read",
            Self::ManifestParse { .. } => "manifest-parse",
            Self::Fetch { .. } => "fetch",
            Self::CacheWrite { .. } => "cache-write",
            Self::UnexpectedArchiveLayout { .. } => "archive-layout",
            Self::Extraction { .. } => "extraction",
            Self::BuildConfigure { .. } => "build-configure",
            Self::BuildFailed { .. } => "build",
            Self::Config { .. } => "config",
            Self::InstallLocked { .. } => "install-locked",
        }
    }
}

/// Error context wrapper that provides user-friendly error information.
///
/// Wraps an [`NpmiError`] with optional details and a suggestion. Suggestions
/// are shown in green, details in yellow.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: anyhow::Error,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: anyhow::Error) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        for cause in self.error.chain().skip(1) {
            eprintln!("  {}: {}", "caused by".dimmed(), cause);
        }

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into an [`ErrorContext`] with an actionable suggestion.
///
/// Recognizes [`NpmiError`] anywhere in the chain and falls back to generic
/// handling for I/O errors and everything else.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let npmi_error = error.chain().find_map(|e| e.downcast_ref::<NpmiError>()).cloned();

    if let Some(npmi_error) = npmi_error {
        return create_error_context(error, &npmi_error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let suggestion = match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                "Check the ownership and permissions of the project and cache directories"
            }
            std::io::ErrorKind::NotFound => "Check that the directory you are installing into exists",
            _ => "Re-run with --verbose for more information",
        };
        return ErrorContext::new(error).with_suggestion(suggestion);
    }

    ErrorContext::new(error)
}

fn create_error_context(error: anyhow::Error, npmi_error: &NpmiError) -> ErrorContext {
    match npmi_error {
        NpmiError::ManifestRead { path, .. } => ErrorContext::new(error)
            .with_suggestion(format!("Check that {path} is readable"))
            .with_details("The manifest exists but could not be opened"),

        NpmiError::ManifestParse { path, .. } => ErrorContext::new(error)
            .with_suggestion(format!(
                "Check the JSON syntax in {path}. \"dependencies\" must map names to version strings"
            )),

        NpmiError::Fetch { name, .. } => ErrorContext::new(error)
            .with_suggestion(format!(
                "Check your network connection and that '{name}' exists in the configured registry"
            ))
            .with_details(
                "No dependency in this directory was installed because at least one fetch failed. \
                 Archives that did download are kept in the cache for the next run",
            ),

        NpmiError::CacheWrite { .. } => ErrorContext::new(error)
            .with_suggestion("Check free disk space and permissions of the cache directory, or run with --no-cache"),

        NpmiError::UnexpectedArchiveLayout { .. } => ErrorContext::new(error)
            .with_details("Package archives must wrap their contents in a single top-level directory")
            .with_suggestion("Clear the cached archive with 'npmi cache clean' and retry"),

        NpmiError::Extraction { .. } => ErrorContext::new(error)
            .with_suggestion("The archive may be corrupt. Run 'npmi cache clean' and retry"),

        NpmiError::BuildConfigure { stderr, .. } | NpmiError::BuildFailed { stderr, .. } => {
            let ctx = ErrorContext::new(error).with_suggestion(
                "Make sure the native build tool and a C/C++ toolchain are installed, or set 'build_tool' in ~/.npmi/config.toml",
            );
            if stderr.trim().is_empty() {
                ctx
            } else {
                ctx.with_details(stderr.trim().to_string())
            }
        }

        NpmiError::Config { .. } => ErrorContext::new(error)
            .with_suggestion("Fix or remove ~/.npmi/config.toml (or the file named by NPMI_CONFIG)"),

        NpmiError::InstallLocked { .. } => ErrorContext::new(error)
            .with_suggestion("Wait for the other install to finish before running npmi again"),
    }
}
