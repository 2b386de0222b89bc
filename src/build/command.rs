//! Fluent builder for native build tool invocations.
//!
//! Mirrors how the rest of npmi runs child processes: arguments, working
//! directory and environment are collected first, then [`BuildCommand::execute`]
//! spawns the process under an optional timeout and logs its output.

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

/// A single invocation of the build tool.
#[derive(Debug, Clone)]
pub struct BuildCommand {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    capture_output: bool,
    timeout_duration: Option<Duration>,
    context: Option<String>,
}

/// Result of a command that ran to completion, successfully or not.
#[derive(Debug, Clone)]
pub struct BuildCommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,
    /// Whether the process exited with status 0
    pub success: bool,
    /// Captured standard output (empty when inherited)
    pub stdout: String,
    /// Captured standard error (empty when inherited)
    pub stderr: String,
}

impl BuildCommand {
    /// Start a command for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            capture_output: true,
            timeout_duration: None,
            context: None,
        }
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Let the child write directly to the terminal.
    pub const fn inherit_stdio(mut self) -> Self {
        self.capture_output = false;
        self
    }

    /// Bound the run time; `None` waits indefinitely.
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Label used in log lines.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Run the command to completion.
    ///
    /// A non-zero exit is reported through [`BuildCommandOutput::success`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Fails when the program cannot be spawned or the timeout expires. The
    /// child is killed when its future is dropped on timeout.
    pub async fn execute(self) -> Result<BuildCommandOutput> {
        let start = Instant::now();
        let command_line = self.display();
        let ctx = self.context.as_deref().unwrap_or("build");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true).stdin(Stdio::null());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        if self.capture_output {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        }

        tracing::debug!(target: "npmi::build", "({}) Executing command: {}", ctx, command_line);

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            match timeout(duration, output_future).await {
                Ok(result) => result.with_context(|| format!("Failed to execute {command_line}"))?,
                Err(_) => {
                    tracing::warn!(
                        target: "npmi::build",
                        "({}) Command timed out after {} seconds: {}",
                        ctx,
                        duration.as_secs(),
                        command_line
                    );
                    return Err(anyhow!(
                        "{command_line} timed out after {} seconds",
                        duration.as_secs()
                    ));
                }
            }
        } else {
            output_future.await.with_context(|| format!("Failed to execute {command_line}"))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stdout.is_empty() {
            tracing::debug!(target: "npmi::build", "({}) {}", ctx, stdout.trim());
        }
        if !stderr.is_empty() {
            tracing::debug!(target: "npmi::build", "({}) {}", ctx, stderr.trim());
        }
        if !output.status.success() {
            tracing::debug!(
                target: "npmi::build",
                "({}) Command failed with exit code: {:?}",
                ctx,
                output.status.code()
            );
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "npmi::build", "({}) {} took {:.2}s", ctx, command_line, elapsed.as_secs_f64());
        }

        Ok(BuildCommandOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout,
            stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let output = BuildCommand::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3")
            .execute()
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_runs_in_current_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let output = BuildCommand::new("sh")
            .arg("-c")
            .arg("basename \"$PWD\"")
            .current_dir(temp.path())
            .execute()
            .await
            .unwrap();
        assert!(output.success);
        let name = temp.path().file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(output.stdout, format!("{name}\n"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = BuildCommand::new("sleep")
            .arg("5")
            .with_timeout(Some(Duration::from_millis(50)))
            .execute()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let result = BuildCommand::new("/nonexistent/npmi-build-tool").execute().await;
        assert!(result.is_err());
    }
}
