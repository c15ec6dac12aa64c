use anyhow::Result;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::http::HttpClient;

/// Tunables shared by the strategies and overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interpreter used to run build descriptors and create virtualenvs.
    pub python_interpreter: String,
    /// Python major version used when the archive declares none.
    pub default_python_version: String,
    /// Additional versions recorded when the archive declares none.
    pub default_additional_versions: Vec<String>,
    /// Base URL of the package registry (PyPI JSON API).
    pub registry_url: String,
    /// Upper bound for each subprocess or network call, in seconds.
    pub timeout_secs: u64,
    /// Case-insensitive substrings that mark a doc file as a license file.
    pub license_markers: Vec<String>,
    /// Patterns for doc files, matched against paths below the archive root.
    pub doc_file_patterns: Vec<String>,
    /// Member suffixes that indicate a binary extension.
    pub extension_suffixes: Vec<String>,
    /// Pattern for documentation source directories, matched on full member paths.
    pub sphinx_dir_pattern: String,
    pub baseline_build_dep: String,
    pub docs_build_dep: String,
    /// Registry fields that overwrite archive-derived values.
    pub registry_usable_fields: Vec<String>,
    /// Long descriptions are cut at the first line break after this many bytes.
    pub description_cut: usize,
    pub wrap_width: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            python_interpreter: "python3".to_string(),
            default_python_version: "3".to_string(),
            default_additional_versions: Vec::new(),
            registry_url: "https://pypi.org".to_string(),
            timeout_secs: 300,
            license_markers: vec!["license".to_string(), "copying".to_string()],
            doc_file_patterns: vec![
                r"^(readme|changes|changelog|history|news|authors|contributors|license|licence|copying|notice)(\.[^/]*)?$"
                    .to_string(),
            ],
            extension_suffixes: vec![
                ".c".to_string(),
                ".cpp".to_string(),
                ".cxx".to_string(),
                ".so".to_string(),
                ".pyd".to_string(),
            ],
            sphinx_dir_pattern: r"^[^/]+/docs?$".to_string(),
            baseline_build_dep: "python3-devel".to_string(),
            docs_build_dep: "python3-sphinx".to_string(),
            registry_usable_fields: vec!["home_page".to_string(), "summary".to_string()],
            description_cut: 80 * 8,
            wrap_width: 80,
        }
    }
}

impl Settings {
    /// Defaults overridden by `DISTMETA_PYTHON`, `DISTMETA_PYPI_URL` and
    /// `DISTMETA_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(python) = env::var("DISTMETA_PYTHON") {
            debug!("Using interpreter from DISTMETA_PYTHON: {}", python);
            settings.python_interpreter = python;
        }
        if let Ok(url) = env::var("DISTMETA_PYPI_URL") {
            debug!("Using registry from DISTMETA_PYPI_URL: {}", url);
            settings.registry_url = url;
        }
        if let Ok(secs) = env::var("DISTMETA_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => settings.timeout_secs = secs,
                Err(_) => debug!("Ignoring invalid DISTMETA_TIMEOUT_SECS={:?}", secs),
            }
        }
        settings
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn uses_registry_field(&self, field: &str) -> bool {
        self.registry_usable_fields.iter().any(|f| f == field)
    }

    /// Builds the HTTP client used for registry queries.
    pub fn http_client(&self) -> Result<HttpClient> {
        let client = Client::builder()
            .user_agent(concat!("distmeta/", env!("DISTMETA_VERSION")))
            .timeout(self.timeout())
            .build()?;
        Ok(HttpClient::new(client))
    }
}
