//! HTTP Client Abstraction
//!
//! Manifest fetches go through [`HttpClient::execute`]; media bytes go through
//! [`HttpClient::download_stream`] so large files are never buffered in memory.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Attaches a bearer token when one is available.
    pub fn maybe_bearer_token(self, token: Option<String>) -> Self {
        match token {
            Some(token) => self.bearer_token(token),
            None => self,
        }
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts a non-2xx response into [`BridgeError::HttpStatus`].
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BridgeError::HttpStatus {
                status: self.status,
                url: url.to_string(),
            })
        }
    }
}

/// A streaming response body.
pub struct HttpByteStream {
    pub status: u16,
    /// Length advertised by the server, if any.
    pub content_length: Option<u64>,
    pub body: Box<dyn core_async::io::AsyncRead + Send + Unpin>,
}

impl HttpByteStream {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for HttpByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpByteStream")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Async HTTP client trait
///
/// Implementations own connection pooling and TLS. Transport failures are
/// reported as [`BridgeError::Network`] or [`BridgeError::Timeout`]; status
/// codes are left for the caller to interpret.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn fetch_manifest(client: &dyn HttpClient, url: &str, token: &str) -> Result<String> {
///     let request = HttpRequest::get(url).bearer_token(token);
///     client.execute(request).await?.error_for_status(url)?.text()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a request and buffer the full response body.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute a request and hand back the body as a byte stream.
    ///
    /// Non-2xx responses are returned as-is with their status code.
    async fn download_stream(&self, request: HttpRequest) -> Result<HttpByteStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::get("https://example.com/manifest")
            .header("User-Agent", "signage")
            .maybe_bearer_token(Some("secret".into()))
            .timeout(Duration::from_secs(30));

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://example.com/manifest");
        assert_eq!(
            request.headers.get("Authorization"),
            Some(&"Bearer secret".to_string())
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_missing_token_adds_no_header() {
        let request = HttpRequest::get("https://example.com").maybe_bearer_token(None);
        assert!(!request.headers.contains_key("Authorization"));
    }

    #[test]
    fn test_error_for_status() {
        let ok = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from("{}"),
        };
        assert!(ok.error_for_status("u").is_ok());

        let not_found = HttpResponse {
            status: 404,
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        match not_found.error_for_status("https://x/y") {
            Err(BridgeError::HttpStatus { status, url }) => {
                assert_eq!(status, 404);
                assert_eq!(url, "https://x/y");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
