use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

use super::Overlay;
use crate::config::Settings;
use crate::record::{MergeMode, MetadataRecord, RecordUpdate};
use crate::registry::RegistryClient;
use crate::trove::license_from_trove;

/// Pulls download URL, checksum and the configured usable fields from the
/// package registry.
pub struct RegistryOverlay {
    client: Arc<dyn RegistryClient>,
    settings: Settings,
}

impl RegistryOverlay {
    pub fn new(client: Arc<dyn RegistryClient>, settings: Settings) -> Self {
        Self { client, settings }
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_update(&self, name: &str, version: &str) -> Result<RecordUpdate> {
        let timeout = self.settings.timeout();
        let document = tokio::time::timeout(timeout, self.client.release(name, version))
            .await
            .context("Registry lookup timed out")??;
        let (url, checksum) = document.download_url_and_checksum()?;
        let release = &document.info;

        let usable = |field: &str| {
            self.settings
                .uses_registry_field(field)
                .then(|| release.field(field))
                .flatten()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(RecordUpdate {
            url: Some(url),
            checksum: Some(checksum),
            home_page: usable("home_page"),
            summary: usable("summary"),
            license: license_from_trove(&release.classifiers),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Overlay for RegistryOverlay {
    fn name(&self) -> &'static str {
        "registry"
    }

    async fn apply(&self, mut record: MetadataRecord) -> MetadataRecord {
        match self.fetch_update(&record.name, &record.version).await {
            Ok(update) => {
                info!("Updating {} with registry metadata", record.name);
                record.merge(update, MergeMode::ForceUpdate);
            }
            Err(e) => warn!(
                "Registry metadata for {} {} unavailable, keeping archive data: {:#}",
                record.name, record.version, e
            ),
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::UNKNOWN;
    use crate::registry::{
        Digests, MockRegistryClient, PyPiClient, ReleaseData, ReleaseDocument, ReleaseFile,
    };
    use mockall::predicate::eq;

    fn record() -> MetadataRecord {
        let mut record = MetadataRecord::new("spam-1.0.tar.gz", "spam", "python3-spam", "1.0");
        record.home_page = "https://old.example".into();
        record.license = "BSD".into();
        record.description = "From the archive".into();
        record
    }

    fn document(info: ReleaseData, url: &str) -> ReleaseDocument {
        ReleaseDocument {
            info,
            urls: vec![ReleaseFile {
                packagetype: "sdist".into(),
                url: url.into(),
                digests: Digests {
                    sha256: Some("abc".into()),
                    md5: None,
                },
                md5_digest: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_force_updates_usable_fields() {
        let mut client = MockRegistryClient::new();
        client
            .expect_release()
            .with(eq("spam"), eq("1.0"))
            .times(1)
            .returning(|_, _| {
                Ok(document(
                    ReleaseData {
                        name: "spam".into(),
                        version: "1.0".into(),
                        summary: Some("Breakfast library".into()),
                        home_page: Some("https://spam.example".into()),
                        license: Some("MIT License".into()),
                        classifiers: vec!["License :: OSI Approved :: MIT License".into()],
                        project_urls: None,
                    },
                    "https://files.example/spam-1.0.tar.gz",
                ))
            });

        let overlay = RegistryOverlay::new(Arc::new(client), Settings::default());
        let record = overlay.apply(record()).await;

        assert_eq!(record.home_page, "https://spam.example");
        assert_eq!(record.summary, "Breakfast library");
        assert_eq!(record.license, "MIT");
        assert_eq!(record.url, "https://files.example/spam-1.0.tar.gz");
        assert_eq!(record.checksum, "abc");
        assert_eq!(record.description, "From the archive");
    }

    #[tokio::test]
    async fn test_ambiguous_license_and_empty_fields_keep_archive_values() {
        let mut client = MockRegistryClient::new();
        client.expect_release().returning(|_, _| {
            Ok(document(
                ReleaseData {
                    home_page: Some("  ".into()),
                    classifiers: vec![
                        "License :: OSI Approved :: MIT License".into(),
                        "License :: OSI Approved :: Apache Software License".into(),
                    ],
                    ..Default::default()
                },
                "https://files.example/spam.tar.gz",
            ))
        });

        let overlay = RegistryOverlay::new(Arc::new(client), Settings::default());
        let record = overlay.apply(record()).await;

        assert_eq!(record.home_page, "https://old.example");
        assert_eq!(record.summary, UNKNOWN);
        assert_eq!(record.license, "BSD");
    }

    #[test_log::test(tokio::test)]
    async fn test_failure_leaves_record_unchanged() {
        let mut client = MockRegistryClient::new();
        client
            .expect_release()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));

        let overlay = RegistryOverlay::new(Arc::new(client), Settings::default());
        let before = record();
        let after = overlay.apply(before.clone()).await;
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_release_document_is_fetched_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/spam/1.0/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"info": {"summary": "Breakfast library"},
                    "urls": [{"packagetype": "sdist", "url": "https://files.example/spam-1.0.tar.gz", "digests": {"sha256": "ccc"}}]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let settings = Settings::default();
        let client = PyPiClient::new(settings.http_client().unwrap(), server.url());
        let overlay = RegistryOverlay::new(Arc::new(client), settings);
        let record = overlay.apply(record()).await;

        mock.assert_async().await;
        assert_eq!(record.checksum, "ccc");
        assert_eq!(record.summary, "Breakfast library");
    }
}
