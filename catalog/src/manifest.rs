//! Client for the upstream version manifest, the authoritative list of
//! release identifiers and their release times.
use crate::histogram;
use crate::metrics_defs::MANIFEST_FETCH_DURATION;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Instant;

pub const DEFAULT_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("manifest request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("manifest request returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("manifest lists no versions")]
    Empty,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(rename = "releaseTime")]
    pub release_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct VersionManifest {
    #[serde(default)]
    pub versions: Vec<ManifestEntry>,
}

impl VersionManifest {
    /// Exact identifier match.
    pub fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[derive(Clone)]
pub struct ManifestClient {
    client: reqwest::Client,
    url: String,
}

impl ManifestClient {
    pub fn new(url: String) -> Self {
        ManifestClient {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub async fn fetch(&self) -> Result<VersionManifest, ManifestError> {
        let started = Instant::now();
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(ManifestError::Status(response.status()));
        }

        let manifest = response.json::<VersionManifest>().await?;
        if manifest.is_empty() {
            return Err(ManifestError::Empty);
        }
        histogram!(MANIFEST_FETCH_DURATION).record(started.elapsed().as_secs_f64());
        tracing::debug!(
            url = %self.url,
            entries = manifest.versions.len(),
            "Fetched version manifest"
        );

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MANIFEST_BODY, mount_manifest};
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let manifest: VersionManifest = serde_json::from_str(MANIFEST_BODY).unwrap();
        assert_eq!(manifest.versions.len(), 3);

        let entry = manifest.entry("1.21.4").unwrap();
        assert_eq!(
            entry.release_time,
            Utc.with_ymd_and_hms(2024, 12, 3, 10, 12, 57).unwrap()
        );

        // Lookups are exact, no prefix matching.
        assert!(manifest.entry("1.21.40").is_none());
        assert!(manifest.entry("1.21.").is_none());
    }

    #[tokio::test]
    async fn test_fetch() {
        let mock_server = MockServer::start().await;
        mount_manifest(&mock_server, 1).await;

        let client = ManifestClient::new(format!("{}/manifest.json", mock_server.uri()));
        let manifest = client.fetch().await.unwrap();
        assert!(manifest.entry("1.21").is_some());
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = ManifestClient::new(format!("{}/manifest.json", mock_server.uri()));
        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, ManifestError::Status(s) if s.as_u16() == 503));
    }

    #[tokio::test]
    async fn test_fetch_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&mock_server)
            .await;

        let client = ManifestClient::new(format!("{}/manifest.json", mock_server.uri()));
        assert!(matches!(client.fetch().await, Err(ManifestError::Empty)));
    }
}
