//! Wire format between the capture command and the host.
//!
//! The child prints [`CAPTURE_MARKER`] on its own line followed by one JSON
//! document. Anything the descriptor printed before that is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ExtractError, Result};
use crate::record::UNKNOWN;

pub const CAPTURE_MARKER: &str = "extracted json data:";

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CapturePayload {
    Ok { distribution: RawDistribution },
    Error { message: String },
}

/// A list-like attribute as the descriptor declared it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawList {
    Items(Vec<Value>),
    Text(String),
}

/// Distribution attributes exactly as captured, nothing coerced yet.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawDistribution {
    pub install_requires: Option<RawList>,
    pub setup_requires: Option<RawList>,
    pub tests_require: Option<RawList>,
    pub conflicts: Option<RawList>,
    pub packages: Option<RawList>,
    pub py_modules: Option<RawList>,
    pub scripts: Option<RawList>,
    pub namespace_packages: Option<RawList>,
    pub classifiers: Option<RawList>,
    pub url: Option<Value>,
    pub long_description: Option<Value>,
    pub description: Option<Value>,
    pub license: Option<Value>,
    pub entry_points: Option<Value>,
    pub test_suite: Option<Value>,
}

/// Captured build descriptor with every attribute present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildDescriptorResult {
    pub install_requires: Vec<String>,
    pub setup_requires: Vec<String>,
    pub tests_require: Vec<String>,
    pub conflicts: Vec<String>,
    pub packages: Vec<String>,
    pub py_modules: Vec<String>,
    pub scripts: Vec<String>,
    pub namespace_packages: Vec<String>,
    /// Entry point group -> `name = module:attr` lines.
    pub entry_points: BTreeMap<String, Vec<String>>,
    pub url: String,
    pub long_description: String,
    pub description: String,
    pub license: String,
    pub classifiers: Vec<String>,
    pub test_suite: Option<String>,
}

impl BuildDescriptorResult {
    pub fn has_entry_points(&self) -> bool {
        self.entry_points.values().any(|lines| !lines.is_empty())
    }

    /// Names declared under `[console_scripts]`; a line without `=` is the
    /// name itself.
    pub fn console_scripts(&self) -> Vec<String> {
        self.entry_points
            .get("console_scripts")
            .map(|lines| {
                lines
                    .iter()
                    .map(|line| line.split_once('=').map_or(line.as_str(), |(name, _)| name).trim())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<RawDistribution> for BuildDescriptorResult {
    fn from(raw: RawDistribution) -> Self {
        Self {
            install_requires: to_list(raw.install_requires),
            setup_requires: to_list(raw.setup_requires),
            tests_require: to_list(raw.tests_require),
            conflicts: to_list(raw.conflicts),
            packages: to_list(raw.packages),
            py_modules: to_list(raw.py_modules),
            scripts: to_list(raw.scripts),
            namespace_packages: to_list(raw.namespace_packages),
            entry_points: to_entry_points(raw.entry_points),
            url: to_text(raw.url),
            long_description: to_text(raw.long_description),
            description: to_text(raw.description),
            license: to_text(raw.license),
            classifiers: to_list(raw.classifiers),
            test_suite: match raw.test_suite {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
                _ => None,
            },
        }
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn to_list(raw: Option<RawList>) -> Vec<String> {
    match raw {
        None => Vec::new(),
        Some(RawList::Text(text)) => split_lines(&text),
        Some(RawList::Items(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
    }
}

fn to_text(raw: Option<Value>) -> String {
    match raw {
        Some(Value::String(s)) => s,
        _ => UNKNOWN.to_string(),
    }
}

fn to_entry_points(raw: Option<Value>) -> BTreeMap<String, Vec<String>> {
    let Some(Value::Object(groups)) = raw else {
        return BTreeMap::new();
    };
    groups
        .into_iter()
        .map(|(group, lines)| {
            let lines = match lines {
                Value::String(text) => split_lines(&text),
                Value::Array(items) => items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            (group, lines)
        })
        .collect()
}

/// Parse the segment after the last capture marker in `stdout`.
pub fn parse_capture_output(stdout: &str) -> Result<BuildDescriptorResult> {
    let Some((_, tail)) = stdout.rsplit_once(CAPTURE_MARKER) else {
        return Err(ExtractError::SandboxExecution(
            "descriptor output carries no capture marker".to_string(),
        ));
    };
    let payload: CapturePayload = serde_json::from_str(tail.trim()).map_err(|e| {
        ExtractError::SandboxExecution(format!("unparsable capture payload: {}", e))
    })?;
    match payload {
        CapturePayload::Ok { distribution } => Ok(distribution.into()),
        CapturePayload::Error { message } => Err(ExtractError::SandboxExecution(message)),
    }
}
