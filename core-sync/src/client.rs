//! Manifest client
//!
//! [`ManifestSource`] is the seam between the sync manager and the backend.
//! [`HttpManifestClient`] implements it over the `HttpClient` bridge.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::{HttpClient, HttpRequest, RegistrationProvider};
use core_content::{ContentId, Manifest};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetches the manifest assigned to `device_id`.
    async fn fetch_manifest(&self, device_id: &str) -> Result<Manifest>;

    /// Resolves a short-lived download URL for one content item.
    async fn resolve_download_url(&self, device_id: &str, content_id: &ContentId) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct DownloadUrlResponse {
    url: String,
}

/// `ManifestSource` backed by the device content API.
///
/// - `GET {base}/devices/{id}/content/manifest`
/// - `GET {base}/devices/{id}/content/{content_id}/download-url` → `{"url": …}`
///
/// Both requests carry the registration bearer token when one is available.
pub struct HttpManifestClient {
    http: Arc<dyn HttpClient>,
    registration: Arc<dyn RegistrationProvider>,
    base_url: String,
}

impl HttpManifestClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        registration: Arc<dyn RegistrationProvider>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            registration,
            base_url,
        }
    }

    pub fn manifest_url(&self, device_id: &str) -> String {
        format!("{}/devices/{}/content/manifest", self.base_url, device_id)
    }

    pub fn download_url_endpoint(&self, device_id: &str, content_id: &ContentId) -> String {
        format!(
            "{}/devices/{}/content/{}/download-url",
            self.base_url, device_id, content_id
        )
    }

    async fn get(&self, url: &str) -> Result<bridge_traits::HttpResponse> {
        let token = self.registration.auth_token().await;
        let request = HttpRequest::get(url)
            .maybe_bearer_token(token)
            .timeout(REQUEST_TIMEOUT);
        let response = self.http.execute(request).await?;
        Ok(response.error_for_status(url)?)
    }
}

#[async_trait]
impl ManifestSource for HttpManifestClient {
    #[instrument(skip(self))]
    async fn fetch_manifest(&self, device_id: &str) -> Result<Manifest> {
        let url = self.manifest_url(device_id);
        let response = self.get(&url).await?;
        let manifest = Manifest::from_json(&response.body)?;
        debug!(
            items = manifest.items.len(),
            version = manifest.version.as_deref().unwrap_or("-"),
            "Fetched manifest"
        );
        Ok(manifest)
    }

    #[instrument(skip(self), fields(content_id = %content_id))]
    async fn resolve_download_url(&self, device_id: &str, content_id: &ContentId) -> Result<String> {
        let url = self.download_url_endpoint(device_id, content_id);
        let response = self.get(&url).await?;
        let body: DownloadUrlResponse = response
            .json()
            .map_err(|e| SyncError::InvalidManifest(format!("download URL response: {e}")))?;
        if body.url.trim().is_empty() {
            return Err(SyncError::InvalidManifest("empty download URL".to_string()));
        }
        Ok(body.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::mock::{MockHttpClient, MockRoute, StaticRegistration};

    fn client(http: Arc<MockHttpClient>) -> HttpManifestClient {
        HttpManifestClient::new(
            http,
            Arc::new(StaticRegistration::registered("dev-7", "secret")),
            "https://api.example.com/v1/",
        )
    }

    #[tokio::test]
    async fn test_fetch_manifest_with_bearer_token() {
        let http = Arc::new(MockHttpClient::new());
        http.serve_json(
            "https://api.example.com/v1/devices/dev-7/content/manifest",
            &serde_json::json!({
                "items": [{"id": "a", "url": "https://cdn/a.jpg", "size": 10, "type": "image"}],
                "version": 3,
                "timestamp": 1700000000
            }),
        );

        let manifest = client(http.clone()).fetch_manifest("dev-7").await.unwrap();

        assert_eq!(manifest.items.len(), 1);
        assert_eq!(manifest.version.as_deref(), Some("3"));
        let sent = http.requests();
        assert_eq!(
            sent[0].headers.get("Authorization").map(String::as_str),
            Some("Bearer secret")
        );
    }

    #[tokio::test]
    async fn test_fetch_manifest_status_errors() {
        let http = Arc::new(MockHttpClient::new());
        http.route(
            "https://api.example.com/v1/devices/dev-7/content/manifest",
            MockRoute::status(503),
        );

        let err = client(http).fetch_manifest("dev-7").await.unwrap_err();
        assert!(matches!(err, SyncError::ManifestFetch { retryable: true, .. }));
    }

    #[tokio::test]
    async fn test_garbage_manifest_is_invalid() {
        let http = Arc::new(MockHttpClient::new());
        http.serve(
            "https://api.example.com/v1/devices/dev-7/content/manifest",
            b"<html>".to_vec(),
        );

        let err = client(http).fetch_manifest("dev-7").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidManifest(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_resolve_download_url() {
        let http = Arc::new(MockHttpClient::new());
        http.serve_json(
            "https://api.example.com/v1/devices/dev-7/content/a/download-url",
            &serde_json::json!({"url": "https://cdn.example.com/signed/a.jpg?sig=1"}),
        );

        let url = client(http)
            .resolve_download_url("dev-7", &ContentId::from("a"))
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/signed/a.jpg?sig=1");
    }
}
