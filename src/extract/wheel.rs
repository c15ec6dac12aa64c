use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::{MetadataSource, Requirements};
use crate::archive::Archive;
use crate::config::Settings;
use crate::deps::RequirementGroup;
use crate::error::{ExtractError, Result};
use crate::record::UNKNOWN;

static TEST_EXTRA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"extra\s*==\s*['"](tests?|testing)['"]"#).expect("valid test extra regex")
});

const TEST_EXTRAS: &[&str] = &["test", "tests", "testing"];

/// `extensions["python.details"]` of JSON wheel metadata.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PythonDetails {
    pub project_urls: BTreeMap<String, String>,
    pub document_names: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Extensions {
    #[serde(rename = "python.details")]
    pub details: PythonDetails,
}

/// Wheel metadata in one shape, whichever file it came from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WheelMetadata {
    pub summary: Option<String>,
    pub license: Option<String>,
    pub classifiers: Vec<String>,
    pub run_requires: Vec<RequirementGroup>,
    pub meta_requires: Vec<RequirementGroup>,
    pub build_requires: Vec<RequirementGroup>,
    pub test_requires: Option<Vec<RequirementGroup>>,
    pub extensions: Extensions,

    /// Only filled from `METADATA`.
    #[serde(skip)]
    pub home_page: Option<String>,
    #[serde(skip)]
    pub requires_dist: Option<Vec<String>>,
    #[serde(skip)]
    pub provides_extra: Vec<String>,
    #[serde(skip)]
    pub license_files: Vec<String>,
    #[serde(skip)]
    pub description: Option<String>,
}

/// Parse a `METADATA` file (RFC 822 style headers, long description as body).
pub fn parse_metadata_file(text: &str) -> WheelMetadata {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut lines = text.lines();
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    let body = lines.collect::<Vec<_>>().join("\n");

    let mut metadata = WheelMetadata {
        requires_dist: Some(Vec::new()),
        ..Default::default()
    };
    let mut project_urls = Vec::new();
    for (key, value) in headers {
        match key.to_ascii_lowercase().as_str() {
            "summary" => metadata.summary = Some(value),
            "home-page" => metadata.home_page = Some(value),
            "license" | "license-expression" => {
                metadata.license.get_or_insert(value);
            }
            "classifier" => metadata.classifiers.push(value),
            "requires-dist" => metadata
                .requires_dist
                .get_or_insert_with(Vec::new)
                .push(value),
            "provides-extra" => metadata.provides_extra.push(value),
            "license-file" => metadata.license_files.push(value),
            "project-url" => {
                if let Some((label, url)) = value.split_once(',') {
                    project_urls.push((label.trim().to_lowercase(), url.trim().to_string()));
                }
            }
            "description" => metadata.description = Some(value),
            _ => {}
        }
    }
    if metadata.home_page.is_none() {
        metadata.home_page = project_urls
            .iter()
            .find(|(label, _)| label == "homepage" || label == "home")
            .or(project_urls.first())
            .map(|(_, url)| url.clone());
    }
    if !body.trim().is_empty() {
        metadata.description = Some(body);
    }
    metadata
}

/// Installed file list from `RECORD` (`path,hash,size` lines).
pub fn parse_record(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.split(',').next())
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

/// Console script names from `entry_points.txt`.
fn console_scripts(text: &str) -> Vec<String> {
    let mut in_section = false;
    let mut scripts = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.starts_with('[') {
            in_section = line == "[console_scripts]";
        } else if in_section && let Some((name, _)) = line.split_once('=') {
            scripts.push(name.trim().to_string());
        }
    }
    scripts
}

/// Metadata of a prebuilt wheel; nothing is executed.
#[derive(Debug)]
pub struct WheelSource {
    metadata: WheelMetadata,
    /// Description shipped next to JSON metadata.
    description_file: Option<String>,
    packages: BTreeSet<String>,
    py_modules: BTreeSet<String>,
    scripts: BTreeSet<String>,
    has_extension: bool,
}

impl WheelSource {
    #[tracing::instrument(skip_all)]
    pub fn load(archive: &mut Archive, settings: &Settings) -> Result<Self> {
        let dist_info = archive
            .find_directories(r"^[^/]+\.dist-info$")?
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::MemberNotFound("*.dist-info".to_string()))?;
        debug!("Reading wheel metadata from {}", dist_info);

        let metadata = match Self::read_json_metadata(archive, &dist_info)? {
            Some(metadata) => metadata,
            None => parse_metadata_file(&archive.read_member(&format!("{}/METADATA", dist_info))?),
        };
        let description_file = optional(archive.read_member(&format!("{}/DESCRIPTION.rst", dist_info)))?;

        let installed = match optional(archive.read_member(&format!("{}/RECORD", dist_info)))? {
            Some(record) => parse_record(&record),
            None => archive.list_members()?,
        };
        let data_scripts = format!("{}.data/scripts/", dist_info.trim_end_matches(".dist-info"));
        let mut packages = BTreeSet::new();
        let mut py_modules = BTreeSet::new();
        let mut scripts = BTreeSet::new();
        for path in &installed {
            if let Some(script) = path.strip_prefix(&data_scripts) {
                scripts.insert(script.to_string());
            } else if let Some(module) = path.strip_suffix(".py").filter(|m| !m.contains('/')) {
                py_modules.insert(module.to_string());
            } else if let Some((package, rest)) = path.split_once('/')
                && rest == "__init__.py"
            {
                packages.insert(package.to_string());
            }
        }
        if let Some(entry_points) =
            optional(archive.read_member(&format!("{}/entry_points.txt", dist_info)))?
        {
            scripts.extend(console_scripts(&entry_points));
        }

        Ok(Self {
            metadata,
            description_file,
            packages,
            py_modules,
            scripts,
            has_extension: archive.has_member_with_suffix(&settings.extension_suffixes)?,
        })
    }

    fn read_json_metadata(archive: &mut Archive, dist_info: &str) -> Result<Option<WheelMetadata>> {
        for file in ["pydist.json", "metadata.json"] {
            let path = format!("{}/{}", dist_info, file);
            if let Some(text) = optional(archive.read_member(&path))? {
                let metadata = serde_json::from_str(&text).map_err(|e| ExtractError::ArchiveFormat {
                    path: archive.path().to_path_buf(),
                    reason: format!("invalid {}: {}", path, e),
                })?;
                return Ok(Some(metadata));
            }
        }
        Ok(None)
    }

    fn is_json(&self) -> bool {
        self.metadata.requires_dist.is_none()
    }

    fn test_requires_dist(&self) -> Vec<String> {
        self.metadata
            .requires_dist
            .iter()
            .flatten()
            .filter_map(|spec| {
                let (requirement, marker) = spec.split_once(';')?;
                TEST_EXTRA_RE
                    .is_match(marker)
                    .then(|| requirement.trim().to_string())
            })
            .collect()
    }
}

/// Absent members become `None`; everything else stays an error.
fn optional(result: Result<String>) -> Result<Option<String>> {
    match result {
        Ok(text) => Ok(Some(text)),
        Err(ExtractError::MemberNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

impl MetadataSource for WheelSource {
    fn runtime_requirements(&self) -> Requirements {
        match &self.metadata.requires_dist {
            Some(specs) => Requirements::Flat(specs.clone()),
            None => Requirements::Grouped(
                self.metadata
                    .run_requires
                    .iter()
                    .chain(&self.metadata.meta_requires)
                    .cloned()
                    .collect(),
            ),
        }
    }

    fn runtime_needs_setuptools(&self) -> bool {
        true
    }

    fn build_requirements(&self) -> Requirements {
        if self.is_json() {
            Requirements::Grouped(
                self.metadata
                    .build_requires
                    .iter()
                    .chain(self.metadata.test_requires.iter().flatten())
                    .cloned()
                    .collect(),
            )
        } else {
            Requirements::Flat(self.test_requires_dist())
        }
    }

    fn packages(&self) -> BTreeSet<String> {
        self.packages.clone()
    }

    fn py_modules(&self) -> BTreeSet<String> {
        self.py_modules.clone()
    }

    fn scripts(&self) -> BTreeSet<String> {
        self.scripts.clone()
    }

    fn home_page(&self) -> String {
        let urls = &self.metadata.extensions.details.project_urls;
        self.metadata
            .home_page
            .clone()
            .or_else(|| urls.get("Home").cloned())
            .or_else(|| urls.values().next().cloned())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn description(&self) -> String {
        self.metadata
            .description
            .clone()
            .or_else(|| self.description_file.clone())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn summary(&self) -> String {
        self.metadata.summary.clone().unwrap_or_default()
    }

    fn license(&self) -> String {
        self.metadata.license.clone().unwrap_or_default()
    }

    fn classifiers(&self) -> &[String] {
        &self.metadata.classifiers
    }

    fn has_extension(&self) -> bool {
        self.has_extension
    }

    fn has_test_suite(&self) -> bool {
        if self.is_json() {
            self.metadata.test_requires.is_some()
        } else {
            self.metadata
                .provides_extra
                .iter()
                .any(|extra| TEST_EXTRAS.contains(&extra.to_lowercase().as_str()))
        }
    }

    fn doc_files(&self) -> Vec<String> {
        if self.is_json() {
            let names: BTreeSet<_> = self
                .metadata
                .extensions
                .details
                .document_names
                .values()
                .cloned()
                .collect();
            names.into_iter().collect()
        } else {
            self.metadata.license_files.clone()
        }
    }
}
