use glob::MatchOptions;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::{MetadataSource, Requirements};
use crate::archive::Archive;
use crate::config::Settings;
use crate::error::{ExtractError, Result};
use crate::sandbox::{BuildDescriptorResult, DescriptorRunner};

/// Metadata of a source tree, read by executing its `setup.py`.
#[derive(Debug)]
pub struct SetupPySource {
    dist: BuildDescriptorResult,
    has_extension: bool,
    has_bundled_egg_info: bool,
    doc_files: Vec<String>,
    sphinx_dir: Option<String>,
}

impl SetupPySource {
    #[tracing::instrument(skip(archive, runner, settings))]
    pub async fn load(
        archive: &mut Archive,
        name: &str,
        runner: &dyn DescriptorRunner,
        settings: &Settings,
    ) -> Result<Self> {
        let has_extension = archive.has_member_with_suffix(&settings.extension_suffixes)?;
        let has_bundled_egg_info = !archive.find_directories(r"\.egg-info$")?.is_empty();
        let doc_files = Self::doc_files(archive, settings)?;
        let sphinx_dir = Self::sphinx_dir(archive, settings)?;

        let tmp = TempDir::new()?;
        archive.extract_all(tmp.path())?;
        let setup_py = Self::locate_setup_py(tmp.path(), name)
            .ok_or_else(|| ExtractError::DescriptorNotFound(archive.path().to_path_buf()))?;
        debug!("Found build descriptor {:?}", setup_py);

        let working_dir = setup_py.parent().unwrap_or(tmp.path()).to_path_buf();
        let dist = runner.run(&setup_py, &working_dir).await?;

        Ok(Self {
            dist,
            has_extension,
            has_bundled_egg_info,
            doc_files,
            sphinx_dir,
        })
    }

    /// `<dir>/<name>*/setup.py`, matching the name case-insensitively.
    fn locate_setup_py(dir: &Path, name: &str) -> Option<PathBuf> {
        let pattern = format!(
            "{}/{}*/setup.py",
            glob::Pattern::escape(&dir.to_string_lossy()),
            glob::Pattern::escape(name)
        );
        let options = MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };
        match glob::glob_with(&pattern, options) {
            Ok(paths) => paths.flatten().next(),
            Err(e) => {
                warn!("Invalid descriptor pattern {}: {}", pattern, e);
                None
            }
        }
    }

    /// Doc file candidates relative to the archive root, first match wins.
    fn doc_files(archive: &Archive, settings: &Settings) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut docs = Vec::new();
        for pattern in &settings.doc_file_patterns {
            for path in archive.find(pattern, true, true)? {
                let relative = match path.split_once('/') {
                    Some((_, rest)) => rest.to_string(),
                    None => path,
                };
                if seen.insert(relative.clone()) {
                    docs.push(relative);
                }
            }
        }
        Ok(docs)
    }

    /// Root-relative documentation dir that holds a `conf.py`; the last one
    /// found wins.
    fn sphinx_dir(archive: &Archive, settings: &Settings) -> Result<Option<String>> {
        let mut found = None;
        for dir in archive.find_directories(&settings.sphinx_dir_pattern)? {
            let conf = format!("^{}/conf\\.py$", regex::escape(&dir));
            if !archive.find(&conf, false, false)?.is_empty() {
                found = Some(match dir.split_once('/') {
                    Some((_, rest)) => rest.to_string(),
                    None => dir,
                });
            }
        }
        Ok(found)
    }
}

impl MetadataSource for SetupPySource {
    fn runtime_requirements(&self) -> Requirements {
        Requirements::Flat(self.dist.install_requires.clone())
    }

    fn runtime_needs_setuptools(&self) -> bool {
        self.dist.has_entry_points()
    }

    fn build_requirements(&self) -> Requirements {
        let mut specs = self.dist.setup_requires.clone();
        specs.extend(self.dist.tests_require.iter().cloned());
        Requirements::Flat(specs)
    }

    fn packages(&self) -> BTreeSet<String> {
        self.dist
            .packages
            .iter()
            .filter_map(|p| p.split('.').next())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn py_modules(&self) -> BTreeSet<String> {
        self.dist.py_modules.iter().cloned().collect()
    }

    fn scripts(&self) -> BTreeSet<String> {
        self.dist
            .console_scripts()
            .into_iter()
            .chain(self.dist.scripts.iter().cloned())
            .filter_map(|s| {
                Path::new(&s)
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
            })
            .collect()
    }

    fn home_page(&self) -> String {
        self.dist.url.clone()
    }

    fn description(&self) -> String {
        self.dist.long_description.clone()
    }

    fn summary(&self) -> String {
        self.dist.description.clone()
    }

    fn license(&self) -> String {
        self.dist.license.clone()
    }

    fn classifiers(&self) -> &[String] {
        &self.dist.classifiers
    }

    fn has_extension(&self) -> bool {
        self.has_extension
    }

    fn has_test_suite(&self) -> bool {
        self.dist.test_suite.is_some() || !self.dist.tests_require.is_empty()
    }

    fn doc_files(&self) -> Vec<String> {
        self.doc_files.clone()
    }

    /// Namespace packages are importable only through a `.pth` hook.
    fn has_pth(&self, name: &str) -> bool {
        name.contains('.') || !self.dist.namespace_packages.is_empty()
    }

    fn has_bundled_egg_info(&self) -> bool {
        self.has_bundled_egg_info
    }

    fn sphinx_dir(&self) -> Option<String> {
        self.sphinx_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::create_tar_gz;
    use crate::sandbox::{MockDescriptorRunner, RawDistribution};
    use std::fs;
    use tempfile::tempdir;

    fn dist(json: &str) -> BuildDescriptorResult {
        serde_json::from_str::<RawDistribution>(json).unwrap().into()
    }

    #[test]
    fn test_locate_setup_py_case_insensitive() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("Spam-1.0")).unwrap();
        fs::write(dir.path().join("Spam-1.0/setup.py"), "").unwrap();

        let found = SetupPySource::locate_setup_py(dir.path(), "spam").unwrap();
        assert!(found.ends_with("Spam-1.0/setup.py"));
        assert!(SetupPySource::locate_setup_py(dir.path(), "eggs").is_none());
    }

    #[tokio::test]
    async fn test_load_reads_archive_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spam.ns-1.0.tar.gz");
        create_tar_gz(
            &path,
            &[
                ("spam.ns-1.0/setup.py", ""),
                ("spam.ns-1.0/README.md", ""),
                ("spam.ns-1.0/doc/conf.py", ""),
                ("spam.ns-1.0/docs/index.rst", ""),
            ],
        );

        let mut runner = MockDescriptorRunner::new();
        runner.expect_run().times(1).returning(|_, _| {
            Ok(dist(
                r#"{"namespace_packages": ["spam"], "scripts": ["bin/spam"], "test_suite": "tests"}"#,
            ))
        });

        let mut archive = Archive::open(&path).unwrap();
        let source = SetupPySource::load(&mut archive, "spam.ns", &runner, &Settings::default())
            .await
            .unwrap();

        assert_eq!(source.doc_files(), vec!["README.md"]);
        assert_eq!(source.sphinx_dir().as_deref(), Some("doc"));
        assert!(source.has_pth("spam"));
        assert!(source.has_test_suite());
        assert!(!source.has_extension());
        assert_eq!(source.scripts(), BTreeSet::from(["spam".to_string()]));
        assert_eq!(source.runtime_requirements(), Requirements::Flat(vec![]));
        assert!(!source.runtime_needs_setuptools());
    }
}
