//! Manifest reading for npmi.
//!
//! A manifest is the `package.json` at the root of every installable
//! directory. Only its `dependencies` map matters to the installer; `name` and
//! `version` are read when present and used for log context.
//!
//! # Ordering
//!
//! `serde_json` is built with `preserve_order`, so [`PackageManifest::dependencies`]
//! yields entries in the order they are written in the file. The installer
//! relies on that order for its sequential install phase.
//!
//! # Missing files and fields
//!
//! A directory without a manifest has nothing to install, and a manifest
//! without a `dependencies` field declares no dependencies. Neither is an error,
//! which lets the installer recurse into arbitrary package directories.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::constants::MANIFEST_FILE;
use crate::core::{Dependency, NpmiError};

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: Option<Value>,
}

/// The parts of a `package.json` the installer uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    /// Declared package name, if any
    pub name: Option<String>,
    /// Declared package version, if any
    pub version: Option<String>,
    dependencies: Vec<Dependency>,
}

impl PackageManifest {
    /// Load and parse a manifest file.
    ///
    /// # Errors
    ///
    /// - [`NpmiError::ManifestRead`] if the file cannot be read
    /// - [`NpmiError::ManifestParse`] if it is not valid JSON, or if
    ///   `dependencies` is not an object of strings
    pub async fn load(path: &Path) -> Result<Self> {
        let content =
            tokio::fs::read_to_string(path).await.map_err(|e| NpmiError::ManifestRead {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Self::parse(&content, path)
    }

    /// Parse manifest content. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let parse_error = |reason: String| NpmiError::ManifestParse {
            path: origin.display().to_string(),
            reason,
        };

        let raw: RawManifest =
            serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?;

        let dependencies = match raw.dependencies {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(map)) => dependencies_from_map(map).map_err(parse_error)?,
            Some(other) => {
                return Err(parse_error(format!(
                    "\"dependencies\" must be an object, found {}",
                    json_type_name(&other)
                ))
                .into());
            }
        };

        Ok(Self {
            name: raw.name,
            version: raw.version,
            dependencies,
        })
    }

    /// Declared dependencies in manifest order.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Consume the manifest, returning its dependency list.
    #[must_use]
    pub fn into_dependencies(self) -> Vec<Dependency> {
        self.dependencies
    }
}

fn dependencies_from_map(map: Map<String, Value>) -> std::result::Result<Vec<Dependency>, String> {
    map.into_iter()
        .map(|(name, spec)| match spec {
            Value::String(_) if !is_valid_package_name(&name) => {
                Err(format!("'{name}' is not a valid package name"))
            }
            Value::String(spec) => Ok(Dependency::new(name, spec)),
            other => Err(format!(
                "version specifier for '{name}' must be a string, found {}",
                json_type_name(&other)
            )),
        })
        .collect()
}

/// Names become paths under `node_modules`, so only `name` and
/// `@scope/name` forms are accepted.
fn is_valid_package_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('/').collect();
    let well_formed = match parts.as_slice() {
        [single] => !single.starts_with('@'),
        [scope, _] => scope.len() > 1 && scope.starts_with('@'),
        _ => false,
    };
    well_formed
        && parts.iter().all(|part| {
            !part.is_empty() && *part != "." && *part != ".." && !part.contains('\\')
        })
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read the dependency list of the manifest in `dir`.
///
/// Returns `Ok(None)` when `dir` has no manifest at all.
pub async fn read_dependencies(dir: &Path) -> Result<Option<PackageManifest>> {
    let path = dir.join(MANIFEST_FILE);
    match tokio::fs::symlink_metadata(&path).await {
        Ok(_) => PackageManifest::load(&path).await.map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(NpmiError::ManifestRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(manifest: &PackageManifest) -> Vec<&str> {
        manifest.dependencies().iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_parse_preserves_declared_order() {
        let manifest = PackageManifest::parse(
            r#"{"name":"root","dependencies":{"zeta":"1.0.0","alpha":"~2.0.0","mid":"*"}}"#,
            Path::new("package.json"),
        )
        .unwrap();

        assert_eq!(names(&manifest), ["zeta", "alpha", "mid"]);
        assert_eq!(manifest.dependencies()[1].version_spec, "~2.0.0");
        assert_eq!(manifest.name.as_deref(), Some("root"));
    }

    #[test]
    fn test_parse_without_dependencies() {
        let manifest =
            PackageManifest::parse(r#"{"name":"leaf","version":"1.0.0"}"#, Path::new("p")).unwrap();
        assert!(manifest.dependencies().is_empty());

        let manifest = PackageManifest::parse(r#"{"dependencies":null}"#, Path::new("p")).unwrap();
        assert!(manifest.dependencies().is_empty());
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = PackageManifest::parse("{ not json", Path::new("p")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NpmiError>(),
            Some(NpmiError::ManifestParse { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_string_spec() {
        let err =
            PackageManifest::parse(r#"{"dependencies":{"a":1}}"#, Path::new("p")).unwrap_err();
        match err.downcast_ref::<NpmiError>() {
            Some(NpmiError::ManifestParse { reason, .. }) => assert!(reason.contains("'a'")),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = PackageManifest::parse(r#"{"dependencies":["a"]}"#, Path::new("p")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NpmiError>(),
            Some(NpmiError::ManifestParse { .. })
        ));
    }

    #[test]
    fn test_rejects_names_escaping_node_modules() {
        for name in ["../evil", "/abs", "a/b", "@scope/../x", "", "@/x", "a\\b"] {
            let content = serde_json::json!({ "dependencies": { name: "1.0.0" } }).to_string();
            let err = PackageManifest::parse(&content, Path::new("p")).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<NpmiError>(), Some(NpmiError::ManifestParse { .. })),
                "{name} should be rejected"
            );
        }

        let manifest = PackageManifest::parse(
            r#"{"dependencies":{"@scope/pkg":"1.0.0","left-pad":"1.3.0"}}"#,
            Path::new("p"),
        )
        .unwrap();
        assert_eq!(manifest.dependencies().len(), 2);
    }

    #[test]
    fn test_duplicate_key_last_value_wins() {
        let manifest = PackageManifest::parse(
            r#"{"dependencies":{"a":"1.0.0","b":"1.0.0","a":"2.0.0"}}"#,
            Path::new("p"),
        )
        .unwrap();
        assert_eq!(manifest.dependencies().len(), 2);
        let a = manifest.dependencies().iter().find(|d| d.name == "a").unwrap();
        assert_eq!(a.version_spec, "2.0.0");
    }

    #[tokio::test]
    async fn test_read_dependencies_missing_manifest() {
        let temp = TempDir::new().unwrap();
        assert!(read_dependencies(temp.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_dependencies_from_disk() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(MANIFEST_FILE), r#"{"dependencies":{"x":"1.2.3"}}"#)
            .unwrap();

        let manifest = read_dependencies(temp.path()).await.unwrap().unwrap();
        assert_eq!(manifest.into_dependencies(), vec![Dependency::new("x", "1.2.3")]);
    }

    #[tokio::test]
    async fn test_load_unreadable_manifest() {
        let temp = TempDir::new().unwrap();
        // A directory in place of the file cannot be read as text.
        std::fs::create_dir(temp.path().join(MANIFEST_FILE)).unwrap();

        let err = read_dependencies(temp.path()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NpmiError>(),
            Some(NpmiError::ManifestRead { .. })
        ));
    }
}
