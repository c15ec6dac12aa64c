mod types;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;

use crate::http::HttpClient;

pub use types::{Digests, ReleaseData, ReleaseDocument, ReleaseFile};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// The release document for one version, fetched once per call.
    async fn release(&self, name: &str, version: &str) -> Result<ReleaseDocument>;
}

/// PyPI JSON API client.
pub struct PyPiClient {
    http: HttpClient,
    base_url: String,
}

impl PyPiClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }
}

#[async_trait]
impl RegistryClient for PyPiClient {
    #[tracing::instrument(skip(self))]
    async fn release(&self, name: &str, version: &str) -> Result<ReleaseDocument> {
        let url = format!("{}/pypi/{}/{}/json", self.base_url, name, version);
        debug!("Fetching release {} {} from {}...", name, version, url);
        self.http
            .get_json::<ReleaseDocument>(&url)
            .await
            .with_context(|| format!("Failed to fetch release data for {} {}", name, version))
    }
}
