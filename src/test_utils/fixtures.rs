//! Test fixtures for package archives, fetchers and build tools
//!
//! - [`TarballBuilder`] builds npm-style `.tgz` archives in memory
//! - [`FakeFetcher`] serves those archives with controllable latency and failures
//! - [`fake_build_tool`] writes a shell script standing in for `node-gyp`

use anyhow::{Result, anyhow};
use flate2::Compression;
use flate2::write::GzEncoder;
use futures::StreamExt;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::fetch::{ArchiveStream, Fetcher};

/// Builder for package archives.
///
/// By default every file lives under a single `package/` wrapper directory,
/// the way registry tarballs are laid out.
#[derive(Clone, Debug)]
pub struct TarballBuilder {
    root: Option<String>,
    manifest: Option<(String, String)>,
    dependencies: Vec<(String, String)>,
    files: Vec<(String, Vec<u8>)>,
    links: Vec<(String, String)>,
}

impl TarballBuilder {
    /// A package archive with a `package.json` naming `name` and `version`.
    pub fn package(name: &str, version: &str) -> Self {
        Self {
            root: Some("package".to_string()),
            manifest: Some((name.to_string(), version.to_string())),
            dependencies: Vec::new(),
            files: Vec::new(),
            links: Vec::new(),
        }
    }

    /// An archive with no wrapper directory and no manifest.
    pub fn raw() -> Self {
        Self {
            root: None,
            manifest: None,
            dependencies: Vec::new(),
            files: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Declare a dependency in the generated `package.json`.
    pub fn depends_on(mut self, name: &str, spec: &str) -> Self {
        self.dependencies.push((name.to_string(), spec.to_string()));
        self
    }

    /// Add a file relative to the wrapper directory (or archive root for [`raw`](Self::raw)).
    pub fn file(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.files.push((path.to_string(), content.as_ref().to_vec()));
        self
    }

    /// Add a symlink entry at `path` pointing to `target`.
    pub fn symlink(mut self, path: &str, target: impl AsRef<Path>) -> Self {
        self.links.push((path.to_string(), target.as_ref().to_string_lossy().to_string()));
        self
    }

    /// Add a `binding.gyp`, marking the package as needing a native build.
    pub fn native(self) -> Self {
        self.file("binding.gyp", r#"{"targets":[]}"#)
    }

    /// Drop the generated `package.json`, making the package a leaf.
    pub fn without_manifest(mut self) -> Self {
        self.manifest = None;
        self
    }

    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut entries = Vec::new();

        if let Some((name, version)) = &self.manifest {
            let mut deps = Map::new();
            for (dep, spec) in &self.dependencies {
                deps.insert(dep.clone(), Value::String(spec.clone()));
            }
            let manifest = json!({
                "name": name,
                "version": version,
                "dependencies": Value::Object(deps),
            });
            entries.push(("package.json".to_string(), serde_json::to_vec_pretty(&manifest)?));
        }
        entries.extend(self.files.iter().cloned());

        Ok(entries.into_iter().map(|(path, data)| (self.rooted(path), data)).collect())
    }

    fn rooted(&self, path: String) -> String {
        match &self.root {
            Some(root) => format!("{root}/{path}"),
            None => path,
        }
    }

    /// Uncompressed tar bytes.
    pub fn tar_bytes(&self) -> Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in self.entries()? {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            builder.append_data(&mut header, &path, data.as_slice())?;
        }
        for (path, target) in &self.links {
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            header.set_mode(0o777);
            header.set_entry_type(tar::EntryType::Symlink);
            builder.append_link(&mut header, self.rooted(path.clone()), target)?;
        }
        Ok(builder.into_inner()?)
    }

    /// Gzip-compressed tar bytes, as served by a registry.
    pub fn gz_bytes(&self) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.tar_bytes()?)?;
        Ok(encoder.finish()?)
    }

    /// Write the gzip-compressed archive to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.gz_bytes()?)?;
        Ok(())
    }
}

/// In-memory [`Fetcher`] with per-package latency and failure injection.
///
/// Records every fetch start and completion so tests can assert on
/// how often and in which order archives were requested.
#[derive(Default)]
pub struct FakeFetcher {
    packages: Mutex<HashMap<(String, String), Vec<u8>>>,
    delays: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashSet<String>>,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
}

impl FakeFetcher {
    /// An empty fetcher; every request fails with a 404-style error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `archive` for `name` at `spec`.
    pub fn with_package(self, name: &str, spec: &str, archive: &TarballBuilder) -> Self {
        self.add_package(name, spec, archive);
        self
    }

    /// Serve `archive` for `name` at `spec` (non-builder form).
    pub fn add_package(&self, name: &str, spec: &str, archive: &TarballBuilder) {
        let bytes = archive.gz_bytes().expect("fixture archive should build");
        self.packages.lock().unwrap().insert((name.to_string(), spec.to_string()), bytes);
    }

    /// Delay every fetch of `name` by `delay`.
    pub fn with_delay(self, name: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(name.to_string(), delay);
        self
    }

    /// Make every fetch of `name` fail.
    pub fn with_failure(self, name: &str) -> Self {
        self.failures.lock().unwrap().insert(name.to_string());
        self
    }

    /// Number of fetches started.
    pub fn fetch_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    /// `name@spec` of every fetch, in start order.
    pub fn fetched(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// `name@spec` of every successful fetch, in completion order.
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// Forget recorded fetches.
    pub fn reset_counts(&self) {
        self.started.lock().unwrap().clear();
        self.completed.lock().unwrap().clear();
    }
}

impl Fetcher for FakeFetcher {
    async fn fetch(&self, name: &str, spec: &str) -> Result<ArchiveStream> {
        let id = format!("{name}@{spec}");
        self.started.lock().unwrap().push(id.clone());

        let delay = self.delays.lock().unwrap().get(name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.lock().unwrap().contains(name) {
            return Err(anyhow!("simulated network failure for {name}"));
        }

        let bytes = self
            .packages
            .lock()
            .unwrap()
            .get(&(name.to_string(), spec.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {id}"))?;

        self.completed.lock().unwrap().push(id);

        // Two chunks so consumers cannot assume a single read.
        let split = bytes.len() / 2;
        let (head, tail) = (bytes[..split].to_vec(), bytes[split..].to_vec());
        Ok(futures::stream::iter(vec![Ok(head), Ok(tail)]).boxed())
    }
}

/// Write an executable shell script that stands in for the native build tool.
///
/// Each invocation appends `"<phase> <package dir name>"` to `log` and exits
/// with `configure_exit` for `configure` and `build_exit` for anything else.
#[cfg(unix)]
pub fn fake_build_tool(dir: &Path, log: &Path, configure_exit: i32, build_exit: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake-node-gyp");
    let content = format!(
        "#!/bin/sh\n\
         echo \"$1 $(basename \"$PWD\")\" >> '{log}'\n\
         if [ \"$1\" = \"configure\" ]; then\n  echo 'configure failed' >&2\n  exit {configure_exit}\nfi\n\
         echo 'build failed' >&2\n\
         exit {build_exit}\n",
        log = log.display(),
    );
    std::fs::write(&script, content).expect("write fake build tool");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake build tool");
    script
}

/// Read the invocation log written by [`fake_build_tool`].
pub fn read_build_log(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
