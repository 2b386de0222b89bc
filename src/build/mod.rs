//! Native addon builds.
//!
//! A package needs a native build when it ships a `binding.gyp` at its root.
//! The build runs in two phases, `<tool> configure` and then `<tool> build`,
//! both with the package root as working directory. A failed configure never
//! starts the build phase.

mod command;

pub use command::{BuildCommand, BuildCommandOutput};

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{BUILD_DESCRIPTOR_FILE, DEFAULT_BUILD_TIMEOUT, DEFAULT_BUILD_TOOL};
use crate::core::NpmiError;

/// Whether a package needs a native build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPlan {
    /// No build descriptor present
    NoBuild,
    /// `binding.gyp` present at the package root
    NativeBuild,
}

impl BuildPlan {
    /// Inspect `dir` for a build descriptor.
    pub async fn detect(dir: &Path) -> Self {
        if tokio::fs::try_exists(dir.join(BUILD_DESCRIPTOR_FILE)).await.unwrap_or(false) {
            Self::NativeBuild
        } else {
            Self::NoBuild
        }
    }
}

/// One of the two build phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// `<tool> configure`
    Configure,
    /// `<tool> build`
    Build,
}

impl BuildPhase {
    const fn arg(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Build => "build",
        }
    }

    fn error(self, dir: &Path, status: Option<i32>, stderr: String) -> NpmiError {
        let path = dir.display().to_string();
        match self {
            Self::Configure => NpmiError::BuildConfigure { path, status, stderr },
            Self::Build => NpmiError::BuildFailed { path, status, stderr },
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arg())
    }
}

/// Runs the native build tool for packages that need it.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    tool: PathBuf,
    timeout: Option<Duration>,
    inherit_stdio: bool,
}

impl Default for BuildRunner {
    fn default() -> Self {
        Self::new(DEFAULT_BUILD_TOOL).with_timeout(Some(DEFAULT_BUILD_TIMEOUT))
    }
}

impl BuildRunner {
    /// A runner using `tool` (a program name looked up on `PATH`, or a path).
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            timeout: None,
            inherit_stdio: false,
        }
    }

    /// Bound each phase; `None` waits indefinitely.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pass the tool's output through to the terminal instead of capturing it.
    #[must_use]
    pub const fn inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_stdio = inherit;
        self
    }

    /// The configured build tool.
    #[must_use]
    pub fn tool(&self) -> &Path {
        &self.tool
    }

    fn resolved_tool(&self) -> PathBuf {
        which::which(&self.tool).unwrap_or_else(|_| self.tool.clone())
    }

    /// Build the package at `dir` if it has a build descriptor.
    ///
    /// Returns `Ok(false)` when there was nothing to build and `Ok(true)`
    /// after both phases succeeded.
    ///
    /// # Errors
    ///
    /// - [`NpmiError::BuildConfigure`] when configure cannot run or exits non-zero
    /// - [`NpmiError::BuildFailed`] when build cannot run or exits non-zero
    pub async fn build(&self, dir: &Path) -> Result<bool> {
        if BuildPlan::detect(dir).await == BuildPlan::NoBuild {
            return Ok(false);
        }

        tracing::info!(target: "npmi::build", "Building native addon in {}", dir.display());
        self.run_phase(BuildPhase::Configure, dir).await?;
        self.run_phase(BuildPhase::Build, dir).await?;
        tracing::debug!(target: "npmi::build", "Native build finished in {}", dir.display());
        Ok(true)
    }

    async fn run_phase(&self, phase: BuildPhase, dir: &Path) -> Result<()> {
        let context = dir
            .file_name()
            .map_or_else(|| dir.display().to_string(), |name| name.to_string_lossy().to_string());

        let mut command = BuildCommand::new(self.resolved_tool())
            .arg(phase.arg())
            .current_dir(dir)
            .with_timeout(self.timeout)
            .with_context(format!("{context} {phase}"));
        if self.inherit_stdio {
            command = command.inherit_stdio();
        }

        let output = match command.execute().await {
            Ok(output) => output,
            Err(e) => return Err(phase.error(dir, None, format!("{e:#}")).into()),
        };

        if output.success {
            return Ok(());
        }

        let stderr = if output.stderr.trim().is_empty() {
            match output.status {
                Some(code) => format!("{} {phase} exited with status {code}", self.tool.display()),
                None => format!("{} {phase} was terminated by a signal", self.tool.display()),
            }
        } else {
            output.stderr
        };
        Err(phase.error(dir, output.status, stderr).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_detect_build_plan() {
        let temp = TempDir::new().unwrap();
        assert_eq!(BuildPlan::detect(temp.path()).await, BuildPlan::NoBuild);

        std::fs::write(temp.path().join("binding.gyp"), "{}").unwrap();
        assert_eq!(BuildPlan::detect(temp.path()).await, BuildPlan::NativeBuild);
    }

    #[tokio::test]
    async fn test_no_descriptor_skips_tool() {
        let temp = TempDir::new().unwrap();
        let runner = BuildRunner::new("/nonexistent/node-gyp");
        assert!(!runner.build(temp.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_tool_fails_configure() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("binding.gyp"), "{}").unwrap();

        let err = BuildRunner::new("/nonexistent/node-gyp").build(temp.path()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NpmiError>(),
            Some(NpmiError::BuildConfigure { status: None, .. })
        ));
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use crate::test_utils::fixtures::{fake_build_tool, read_build_log};

        fn package(temp: &TempDir, name: &str) -> PathBuf {
            let dir = temp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("binding.gyp"), "{}").unwrap();
            dir
        }

        #[tokio::test]
        async fn test_both_phases_run_in_order() {
            let temp = TempDir::new().unwrap();
            let log = temp.path().join("build.log");
            let tool = fake_build_tool(temp.path(), &log, 0, 0);
            let dir = package(&temp, "addon");

            assert!(BuildRunner::new(tool).build(&dir).await.unwrap());
            assert_eq!(read_build_log(&log), vec!["configure addon", "build addon"]);
        }

        #[tokio::test]
        async fn test_configure_failure_skips_build() {
            let temp = TempDir::new().unwrap();
            let log = temp.path().join("build.log");
            let tool = fake_build_tool(temp.path(), &log, 2, 0);
            let dir = package(&temp, "addon");

            let err = BuildRunner::new(tool).build(&dir).await.unwrap_err();
            match err.downcast_ref::<NpmiError>() {
                Some(NpmiError::BuildConfigure { status, stderr, .. }) => {
                    assert_eq!(*status, Some(2));
                    assert!(stderr.contains("configure failed"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(read_build_log(&log), vec!["configure addon"]);
        }

        #[tokio::test]
        async fn test_build_failure() {
            let temp = TempDir::new().unwrap();
            let log = temp.path().join("build.log");
            let tool = fake_build_tool(temp.path(), &log, 0, 1);
            let dir = package(&temp, "addon");

            let err = BuildRunner::new(tool).build(&dir).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<NpmiError>(),
                Some(NpmiError::BuildFailed { status: Some(1), .. })
            ));
            assert_eq!(read_build_log(&log), vec!["configure addon", "build addon"]);
        }
    }
}
