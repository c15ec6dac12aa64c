use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::{debug, error, info};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

use super::Overlay;
use crate::config::Settings;
use crate::record::{MergeMode, MetadataRecord, RecordUpdate};

/// Top-level entries of `site-packages` that are never packages.
const IGNORED_SUFFIXES: &[&str] = &[".dist-info", ".egg-info", ".egg-link", ".pth"];

/// Installs the archive into a throwaway virtualenv and records what landed
/// in `site-packages` and `bin`.
pub struct VenvOverlay {
    interpreter: String,
    timeout: Duration,
}

/// What an install added to the environment.
#[derive(Debug, Default, PartialEq)]
struct InstallDiff {
    packages: BTreeSet<String>,
    py_modules: BTreeSet<String>,
    scripts: BTreeSet<String>,
}

impl InstallDiff {
    fn into_update(self) -> RecordUpdate {
        let non_empty = |set: BTreeSet<String>| (!set.is_empty()).then_some(set);
        RecordUpdate {
            packages: non_empty(self.packages),
            py_modules: non_empty(self.py_modules),
            scripts: non_empty(self.scripts),
            ..Default::default()
        }
    }
}

/// Names of the direct children of `dir`; a missing dir is empty.
pub fn snapshot_dir(dir: &Path) -> Result<BTreeSet<String>> {
    if !dir.exists() {
        return Ok(BTreeSet::new());
    }
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let entry = entry?;
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Entries present in `after` but not in `before`.
pub fn diff_snapshots(before: &BTreeSet<String>, after: &BTreeSet<String>) -> BTreeSet<String> {
    after.difference(before).cloned().collect()
}

impl VenvOverlay {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.python_interpreter, settings.timeout())
    }

    async fn run_step(&self, program: &Path, args: &[&str]) -> Result<()> {
        debug!("Running {:?} {:?}", program, args);
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {:?}", program))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("{:?} did not finish within {:?}", program, self.timeout))??;

        if !output.status.success() {
            bail!(
                "{:?} {} failed with {}: {}",
                program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn site_packages(venv: &Path) -> Result<PathBuf> {
        let patterns = [
            venv.join("lib").join("python*").join("site-packages"),
            venv.join("Lib").join("site-packages"),
        ];
        for pattern in &patterns {
            let pattern = pattern.to_string_lossy();
            if let Some(found) = glob::glob(&pattern)?.flatten().next() {
                return Ok(found);
            }
        }
        bail!("No site-packages directory in {:?}", venv)
    }

    fn bin_dir(venv: &Path) -> PathBuf {
        let scripts = venv.join("Scripts");
        if scripts.is_dir() {
            scripts
        } else {
            venv.join("bin")
        }
    }

    fn classify(site_packages: &Path, new_entries: BTreeSet<String>) -> InstallDiff {
        let mut diff = InstallDiff::default();
        for entry in new_entries {
            if entry == "__pycache__" || IGNORED_SUFFIXES.iter().any(|s| entry.ends_with(s)) {
                continue;
            }
            if site_packages.join(&entry).is_dir() {
                diff.packages.insert(entry);
            } else if let Some(module) = entry.strip_suffix(".py") {
                diff.py_modules.insert(module.to_string());
            }
        }
        diff
    }

    #[tracing::instrument(skip(self))]
    async fn probe(&self, local_file: &Path) -> Result<InstallDiff> {
        let tmp = TempDir::new().context("Failed to create virtualenv directory")?;
        let venv = tmp.path().join("venv");
        let venv_arg = venv.to_string_lossy();

        self.run_step(Path::new(&self.interpreter), &["-m", "venv", &*venv_arg])
            .await?;

        let site_packages = Self::site_packages(&venv)?;
        let bin = Self::bin_dir(&venv);
        let pip = bin.join("pip");
        let site_before = snapshot_dir(&site_packages)?;
        let bin_before = snapshot_dir(&bin)?;

        let local_arg = local_file.to_string_lossy();
        self.run_step(
            &pip,
            &["install", "--no-deps", "--disable-pip-version-check", &*local_arg],
        )
        .await?;

        let site_after = snapshot_dir(&site_packages)?;
        let bin_after = snapshot_dir(&bin)?;

        let mut diff = Self::classify(&site_packages, diff_snapshots(&site_before, &site_after));
        diff.scripts = diff_snapshots(&bin_before, &bin_after);
        Ok(diff)
    }
}

#[async_trait]
impl Overlay for VenvOverlay {
    fn name(&self) -> &'static str {
        "virtualenv"
    }

    async fn apply(&self, mut record: MetadataRecord) -> MetadataRecord {
        match self.probe(&record.local_file).await {
            Ok(diff) => {
                info!("Updating {} with installed files", record.name);
                record.merge(diff.into_update(), MergeMode::ForceUpdate);
            }
            Err(e) => error!("{:#}, skipping virtualenv metadata extraction", e),
        }
        record
    }
}
