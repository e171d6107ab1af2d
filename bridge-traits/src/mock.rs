//! In-memory bridge doubles for tests.
//!
//! Enabled with the `test-utils` feature. Every double is cheap to clone
//! behind an `Arc` and can be reconfigured while the code under test runs.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;

use crate::device::DeviceCapabilities;
use crate::error::{BridgeError, Result};
use crate::http::{HttpByteStream, HttpClient, HttpRequest, HttpResponse};
use crate::identity::RegistrationProvider;
use crate::network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
use crate::time::{Clock, LogEntry, LoggerSink};

// ============================================================================
// HTTP
// ============================================================================

/// Canned response for one URL.
#[derive(Debug, Clone)]
pub struct MockRoute {
    status: u16,
    body: Bytes,
    chunk_size: usize,
    chunk_delay: Duration,
    fail_after: Option<usize>,
    advertise_length: bool,
}

impl MockRoute {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            chunk_size: 16 * 1024,
            chunk_delay: Duration::ZERO,
            fail_after: None,
            advertise_length: true,
        }
    }

    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::ok(body)
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Bytes::new())
        }
    }

    /// Deliver the body in `size`-byte chunks, sleeping `delay` before each.
    pub fn chunked(mut self, size: usize, delay: Duration) -> Self {
        self.chunk_size = size.max(1);
        self.chunk_delay = delay;
        self
    }

    /// Break the connection after `bytes` bytes have been delivered.
    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    pub fn without_content_length(mut self) -> Self {
        self.advertise_length = false;
        self
    }
}

/// `HttpClient` that serves registered routes and counts every request.
#[derive(Default)]
pub struct MockHttpClient {
    routes: Mutex<HashMap<String, MockRoute>>,
    fetches: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<HttpRequest>>,
    offline: AtomicBool,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: impl Into<String>, route: MockRoute) {
        self.routes.lock().insert(url.into(), route);
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.route(url, MockRoute::ok(body));
    }

    pub fn serve_json<T: serde::Serialize>(&self, url: impl Into<String>, value: &T) {
        self.route(url, MockRoute::json(value));
    }

    /// Every request fails with a transport error while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    /// Requests in arrival order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    fn record(&self, request: &HttpRequest) -> Result<Option<MockRoute>> {
        *self.fetches.lock().entry(request.url.clone()).or_insert(0) += 1;
        self.requests.lock().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(BridgeError::Network("mock client offline".into()));
        }
        Ok(self.routes.lock().get(&request.url).cloned())
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let route = self.record(&request)?.unwrap_or_else(|| MockRoute::status(404));
        Ok(HttpResponse {
            status: route.status,
            headers: HashMap::new(),
            body: route.body,
        })
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<HttpByteStream> {
        let route = self.record(&request)?.unwrap_or_else(|| MockRoute::status(404));
        let content_length = route.advertise_length.then_some(route.body.len() as u64);

        let delivered = match route.fail_after {
            Some(limit) => route.body.slice(..limit.min(route.body.len())),
            None => route.body.clone(),
        };
        let mut items: Vec<io::Result<Bytes>> = delivered
            .chunks(route.chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if route.fail_after.is_some() {
            items.push(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "mock connection reset",
            )));
        }

        let delay = route.chunk_delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                core_async::time::sleep(delay).await;
            }
            item
        });

        Ok(HttpByteStream {
            status: route.status,
            content_length,
            body: Box::new(core_async::io::StreamReader::new(Box::pin(stream))),
        })
    }
}

// ============================================================================
// Network & device
// ============================================================================

/// `NetworkMonitor` reporting a settable transport.
pub struct FixedNetworkMonitor {
    network_type: Mutex<NetworkType>,
}

impl FixedNetworkMonitor {
    pub fn new(network_type: NetworkType) -> Self {
        Self {
            network_type: Mutex::new(network_type),
        }
    }

    pub fn set(&self, network_type: NetworkType) {
        *self.network_type.lock() = network_type;
    }
}

#[async_trait]
impl NetworkMonitor for FixedNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let network_type = *self.network_type.lock();
        Ok(NetworkInfo {
            status: if network_type.is_connected() {
                NetworkStatus::Connected
            } else {
                NetworkStatus::Disconnected
            },
            network_type,
            is_metered: matches!(network_type, NetworkType::Mobile),
        })
    }
}

/// `DeviceCapabilities` with settable codecs, transport, and free space.
pub struct FakeDevice {
    codecs: Mutex<HashSet<String>>,
    network_type: Mutex<NetworkType>,
    free_bytes: Mutex<u64>,
    probes: AtomicUsize,
}

impl FakeDevice {
    /// Ethernet, 10 GB free, common codecs.
    pub fn new() -> Self {
        Self {
            codecs: Mutex::new(
                ["h264", "aac", "vp9", "mp3"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            ),
            network_type: Mutex::new(NetworkType::Ethernet),
            free_bytes: Mutex::new(10 * 1024 * 1024 * 1024),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn with_codecs(self, codecs: &[&str]) -> Self {
        *self.codecs.lock() = codecs.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_network(self, network_type: NetworkType) -> Self {
        self.set_network(network_type);
        self
    }

    pub fn with_free_bytes(self, bytes: u64) -> Self {
        self.set_free_bytes(bytes);
        self
    }

    pub fn set_network(&self, network_type: NetworkType) {
        *self.network_type.lock() = network_type;
    }

    pub fn set_free_bytes(&self, bytes: u64) {
        *self.free_bytes.lock() = bytes;
    }

    /// Number of `current_network_type` calls so far.
    pub fn network_probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceCapabilities for FakeDevice {
    async fn supported_codecs(&self) -> HashSet<String> {
        self.codecs.lock().clone()
    }

    async fn current_network_type(&self) -> NetworkType {
        self.probes.fetch_add(1, Ordering::SeqCst);
        *self.network_type.lock()
    }

    async fn free_storage_bytes(&self) -> Result<u64> {
        Ok(*self.free_bytes.lock())
    }
}

// ============================================================================
// Registration
// ============================================================================

/// `RegistrationProvider` with a fixed id and token.
pub struct StaticRegistration {
    device_id: Mutex<Option<String>>,
    token: Mutex<Option<String>>,
    registered: AtomicBool,
    re_register_succeeds: AtomicBool,
    re_register_calls: AtomicUsize,
}

impl StaticRegistration {
    pub fn registered(device_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            device_id: Mutex::new(Some(device_id.into())),
            token: Mutex::new(Some(token.into())),
            registered: AtomicBool::new(true),
            re_register_succeeds: AtomicBool::new(true),
            re_register_calls: AtomicUsize::new(0),
        }
    }

    pub fn unregistered() -> Self {
        Self {
            device_id: Mutex::new(None),
            token: Mutex::new(None),
            registered: AtomicBool::new(false),
            re_register_succeeds: AtomicBool::new(false),
            re_register_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    pub fn set_re_register_succeeds(&self, succeeds: bool) {
        self.re_register_succeeds.store(succeeds, Ordering::SeqCst);
    }

    pub fn re_register_calls(&self) -> usize {
        self.re_register_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrationProvider for StaticRegistration {
    async fn device_id(&self) -> Option<String> {
        self.device_id.lock().clone()
    }

    async fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst) && self.device_id.lock().is_some()
    }

    async fn auth_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    async fn re_register(&self) -> Result<()> {
        self.re_register_calls.fetch_add(1, Ordering::SeqCst);
        if self.re_register_succeeds.load(Ordering::SeqCst) {
            self.registered.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(BridgeError::OperationFailed("registration rejected".into()))
        }
    }
}

// ============================================================================
// Clock & logging
// ============================================================================

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        *self.now.lock() += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Sink that keeps every entry in memory.
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogger {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl LoggerSink for RecordingLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }

    fn min_level(&self) -> crate::time::LogLevel {
        crate::time::LogLevel::Trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::io::AsyncReadExt;

    #[core_async::test]
    async fn test_chunked_route_fails_midway() {
        let client = MockHttpClient::new();
        client.route(
            "https://cdn/a",
            MockRoute::ok(vec![7u8; 100]).chunked(10, Duration::ZERO).failing_after(30),
        );

        let mut stream = client
            .download_stream(HttpRequest::get("https://cdn/a"))
            .await
            .unwrap();
        assert_eq!(stream.content_length, Some(100));

        let mut buf = Vec::new();
        let err = stream.body.read_to_end(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(buf.len(), 30);
        assert_eq!(client.fetch_count("https://cdn/a"), 1);
    }

    #[core_async::test]
    async fn test_unknown_route_is_404() {
        let client = MockHttpClient::new();
        let response = client.execute(HttpRequest::get("https://nowhere")).await.unwrap();
        assert_eq!(response.status, 404);
    }
}
