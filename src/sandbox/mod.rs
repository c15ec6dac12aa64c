//! Out-of-process execution of an archive's `setup.py`.
//!
//! The descriptor runs under a real interpreter with a small capture command
//! on its command-package path. The command serializes the finished
//! `Distribution` to stdout and the host parses it back (see [`capture`]).

mod capture;

use async_trait::async_trait;
use log::{debug, info};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

use crate::config::Settings;
use crate::error::{ExtractError, Result};

pub use capture::{
    BuildDescriptorResult, CAPTURE_MARKER, CapturePayload, RawDistribution, RawList,
    parse_capture_output,
};

const CAPTURE_PACKAGE: &str = "distmeta_capture";
const CAPTURE_COMMAND: &str = "extract_dist";
const CAPTURE_SOURCE: &str = include_str!("extract_dist.py");

/// Variables kept when the child environment is cleared.
const ISOLATED_ENV_KEEP: &[&str] = &["PATH", "HOME", "LANG", "SYSTEMROOT"];

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DescriptorRunner: Send + Sync {
    /// Execute `descriptor` with `working_dir` as cwd and return its capture.
    async fn run(&self, descriptor: &Path, working_dir: &Path) -> Result<BuildDescriptorResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SandboxMode {
    /// Child gets a cleared environment plus a few basics.
    #[default]
    Isolated,
    /// Child inherits the caller's environment.
    Inherited,
}

#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    interpreter: String,
    mode: SandboxMode,
    timeout: Duration,
}

impl SubprocessRunner {
    pub fn new(interpreter: impl Into<String>, mode: SandboxMode, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            mode,
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings, mode: SandboxMode) -> Self {
        Self::new(&settings.python_interpreter, mode, settings.timeout())
    }

    /// Writes the capture package into `dir` and returns the path to put on
    /// `PYTHONPATH`.
    fn write_capture_package(dir: &Path) -> std::io::Result<PathBuf> {
        let package = dir.join(CAPTURE_PACKAGE);
        std::fs::create_dir_all(&package)?;
        std::fs::write(package.join("__init__.py"), "")?;
        std::fs::write(
            package.join(format!("{}.py", CAPTURE_COMMAND)),
            CAPTURE_SOURCE,
        )?;
        Ok(dir.to_path_buf())
    }

    fn command(&self, descriptor: &Path, working_dir: &Path, python_path: &Path) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(descriptor)
            .args([
                "--quiet",
                "--command-packages",
                CAPTURE_PACKAGE,
                CAPTURE_COMMAND,
            ])
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match self.mode {
            SandboxMode::Isolated => {
                cmd.env_clear();
                for key in ISOLATED_ENV_KEEP {
                    if let Ok(value) = env::var(key) {
                        cmd.env(key, value);
                    }
                }
                cmd.env("PYTHONPATH", python_path);
            }
            SandboxMode::Inherited => {
                let inherited = env::var_os("PYTHONPATH").unwrap_or_default();
                let paths = std::iter::once(python_path.to_path_buf())
                    .chain(env::split_paths(&inherited).filter(|p| !p.as_os_str().is_empty()));
                match env::join_paths(paths) {
                    Ok(joined) => cmd.env("PYTHONPATH", joined),
                    Err(_) => cmd.env("PYTHONPATH", python_path),
                };
            }
        }
        cmd.env("PYTHONDONTWRITEBYTECODE", "1");
        cmd
    }
}

#[async_trait]
impl DescriptorRunner for SubprocessRunner {
    #[tracing::instrument(skip(self))]
    async fn run(&self, descriptor: &Path, working_dir: &Path) -> Result<BuildDescriptorResult> {
        let capture_dir = TempDir::new()?;
        let python_path = Self::write_capture_package(capture_dir.path())?;

        info!("Running {:?} with {}", descriptor, self.interpreter);
        let child = self
            .command(descriptor, working_dir, &python_path)
            .spawn()
            .map_err(|e| {
                ExtractError::SandboxExecution(format!(
                    "cannot start {}: {}",
                    self.interpreter, e
                ))
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ExtractError::SandboxExecution(format!(
                    "{:?} did not finish within {}s",
                    descriptor,
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("Descriptor stderr: {}", stderr.trim());

        if !output.status.success() {
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(ExtractError::SandboxExecution(format!(
                "{:?} exited with {}: {}",
                descriptor,
                output.status,
                tail.join("\n")
            )));
        }

        parse_capture_output(&stdout)
    }
}
