use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `info` section of a PyPI release document.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ReleaseData {
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
    pub home_page: Option<String>,
    pub license: Option<String>,
    pub classifiers: Vec<String>,
    pub project_urls: Option<BTreeMap<String, String>>,
}

impl ReleaseData {
    /// Value of a registry field by its record name.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "home_page" => self.home_page.as_deref(),
            "summary" => self.summary.as_deref(),
            "license" => self.license.as_deref(),
            _ => None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct Digests {
    pub sha256: Option<String>,
    pub md5: Option<String>,
}

/// One downloadable file of a release.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ReleaseFile {
    pub packagetype: String,
    pub url: String,
    #[serde(default)]
    pub digests: Digests,
    pub md5_digest: Option<String>,
}

impl ReleaseFile {
    pub fn checksum(&self) -> Option<&str> {
        self.digests
            .sha256
            .as_deref()
            .or(self.digests.md5.as_deref())
            .or(self.md5_digest.as_deref())
            .filter(|d| !d.is_empty())
    }
}

/// Response of `GET /pypi/<name>/<version>/json`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ReleaseDocument {
    pub info: ReleaseData,
    #[serde(default)]
    pub urls: Vec<ReleaseFile>,
}

impl ReleaseDocument {
    /// Download URL of the release (sdist preferred) and its digest.
    pub fn download_url_and_checksum(&self) -> Result<(String, String)> {
        let file = self
            .urls
            .iter()
            .find(|f| f.packagetype == "sdist")
            .or_else(|| self.urls.first())
            .ok_or_else(|| {
                anyhow!(
                    "No files published for {} {}",
                    self.info.name,
                    self.info.version
                )
            })?;
        let checksum = file
            .checksum()
            .ok_or_else(|| anyhow!("No digest published for {}", file.url))?;
        Ok((file.url.clone(), checksum.to_string()))
    }
}
