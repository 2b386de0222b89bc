//! Common test utilities for npmi integration tests
//!
//! Every [`TestProject`] gets its own project directory, archive cache, local
//! mirror and home directory, so runs never touch the user's `~/.npmi`.

// Not every helper is used by every test binary
#![allow(dead_code)]

use anyhow::{Context, Result};
use npmi_cli::test_utils::TarballBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub struct TestProject {
    _temp_dir: TempDir, // Keep alive for RAII cleanup
    project_dir: PathBuf,
    cache_dir: PathBuf,
    mirror_dir: PathBuf,
    home_dir: PathBuf,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let project_dir = temp_dir.path().join("project");
        let cache_dir = temp_dir.path().join("cache");
        let mirror_dir = temp_dir.path().join("mirror");
        let home_dir = temp_dir.path().join("home");

        fs::create_dir_all(&project_dir)?;
        fs::create_dir_all(&mirror_dir)?;
        fs::create_dir_all(&home_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            project_dir,
            cache_dir,
            mirror_dir,
            home_dir,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_dir
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_dir
    }

    pub fn mirror_path(&self) -> &Path {
        &self.mirror_dir
    }

    pub fn modules_path(&self) -> PathBuf {
        self.project_dir.join("node_modules")
    }

    /// Write `package.json` declaring `deps` in order.
    pub fn write_manifest(&self, deps: &[(&str, &str)]) -> Result<()> {
        npmi_cli::test_utils::write_manifest(&self.project_dir, deps);
        Ok(())
    }

    /// Make `archive` available as `name` at `spec` in the mirror.
    pub fn publish(&self, name: &str, spec: &str, archive: &TarballBuilder) -> Result<()> {
        let path = self.mirror_dir.join(name).join(format!("{spec}.tgz"));
        archive.write_to(&path).with_context(|| format!("Failed to publish {name}@{spec}"))
    }

    /// Number of archives in the persistent cache.
    pub fn cached_archives(&self) -> usize {
        fs::read_dir(&self.cache_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().ends_with(".tar.gz"))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn marker(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.modules_path().join(relative).join(".npmi-install-info")).ok()
    }

    /// A command for the npmi binary with an isolated environment.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_npmi"));
        cmd.current_dir(&self.project_dir)
            .env("HOME", &self.home_dir)
            .env("NPMI_CONFIG", self.home_dir.join("config.toml"))
            .env("NPMI_CACHE_DIR", &self.cache_dir)
            .env("NPMI_REGISTRY", &self.mirror_dir)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn run_npmi(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.command().args(args).output().context("Failed to run npmi command")?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.success,
            "Command failed with code {:?}\nStderr: {}",
            self.code, self.stderr
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Expected stdout to contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Expected stderr to contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
