//! Core types and error handling for npmi.
//!
//! - [`error`] - the [`NpmiError`] taxonomy and user-facing [`ErrorContext`]
//! - [`Dependency`] - one `name → versionSpec` entry read from a manifest

pub mod error;

pub use error::{ErrorContext, NpmiError, user_friendly_error};

use std::fmt;

/// A single declared dependency.
///
/// Uniqueness is by `name` within one manifest. Values are immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Package name, possibly scoped (`@scope/name`)
    pub name: String,
    /// Version specifier exactly as written in the manifest
    pub version_spec: String,
}

impl Dependency {
    /// Create a dependency record.
    pub fn new(name: impl Into<String>, version_spec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_spec: version_spec.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version_spec)
    }
}
