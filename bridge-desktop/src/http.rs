//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use core_async::time::{backoff_delay, sleep};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Buffered requests (`execute`) retry transport failures and 5xx/429
/// responses with exponential backoff. Streamed downloads are attempted once;
/// the download manager owns retries for media bytes.
pub struct ReqwestHttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with a connect timeout of `timeout`.
    ///
    /// Downloads of large media can legitimately take longer than any fixed
    /// request timeout, so only the connection phase is bounded here.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(4)
            .user_agent(concat!("signage-player-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self::with_client(client))
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }
        req
    }

    fn map_transport_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout(e.to_string())
        } else {
            BridgeError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let policy = &self.retry;
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < policy.max_attempts {
            debug!(
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                url = %request.url,
                "Executing HTTP request"
            );

            match self.build_request(&request).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if status >= 500 || status == 429 {
                        warn!(status, attempt = attempt + 1, "HTTP request failed with retryable status");
                        last_error = Some(BridgeError::HttpStatus {
                            status,
                            url: request.url.clone(),
                        });
                    } else {
                        let headers: HashMap<String, String> = response
                            .headers()
                            .iter()
                            .filter_map(|(k, v)| {
                                v.to_str().ok().map(|s| (k.to_string(), s.to_string()))
                            })
                            .collect();

                        let body = response.bytes().await.map_err(Self::map_transport_error)?;

                        return Ok(HttpResponse {
                            status,
                            headers,
                            body,
                        });
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt + 1, "HTTP request failed");
                    last_error = Some(Self::map_transport_error(e));
                }
            }

            attempt += 1;

            if attempt < policy.max_attempts {
                let delay = backoff_delay(policy.base_delay, attempt - 1, policy.max_delay);
                debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::Network("All retry attempts exhausted".to_string())
        }))
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<HttpByteStream> {
        let response = self
            .build_request(&request)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);

        Ok(HttpByteStream {
            status,
            content_length,
            body: Box::new(tokio_util::io::StreamReader::new(stream)),
        })
    }
}
