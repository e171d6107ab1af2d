//! # Core Configuration Module
//!
//! `CoreConfig` carries the host bridges and the handful of settings every
//! component needs (backend URL, cache location). Component policy knobs
//! (storage tiers, throttle rates, retry counts, playlist defaults) live next
//! to the component that enforces them.
//!
//! ## Required Dependencies
//!
//! - `api_base_url` - Backend serving manifests and signed download URLs
//! - `HttpClient`, `FileSystemAccess`, `NetworkMonitor`, `DeviceCapabilities`,
//!   `RegistrationProvider` - injected, or supplied by `desktop-shims`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! // Desktop defaults (requires the `desktop-shims` feature)
//! let config = CoreConfig::builder()
//!     .api_base_url("https://signage.example.com/api")
//!     .cache_dir("/var/cache/signage")
//!     .build()?;
//! ```
//!
//! ```ignore
//! // Embedded host injecting its own adapters
//! let config = CoreConfig::builder()
//!     .api_base_url("https://signage.example.com/api")
//!     .http_client(Arc::new(MyHttpClient))
//!     .file_system(Arc::new(MyFileSystem))
//!     .network_monitor(Arc::new(MyConnectivity))
//!     .device_capabilities(Arc::new(MyDevice))
//!     .registration(Arc::new(MyRegistration))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, DeviceCapabilities, FileSystemAccess, HttpClient, LoggerSink, NetworkMonitor,
    RegistrationProvider, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Core configuration shared by every player service.
#[derive(Clone)]
pub struct CoreConfig {
    /// Backend base URL, without trailing slash
    pub api_base_url: String,

    /// Cache directory override; defaults to `<fs cache dir>/content`
    pub cache_dir: Option<PathBuf>,

    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub network: Arc<dyn NetworkMonitor>,
    pub device: Arc<dyn DeviceCapabilities>,
    pub registration: Arc<dyn RegistrationProvider>,
    pub clock: Arc<dyn Clock>,

    /// Host diagnostics sink mirrored by the logging layer
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Capacity of the diagnostics event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("api_base_url", &self.api_base_url)
            .field("cache_dir", &self.cache_dir)
            .field("logger_sink", &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"))
            .field("event_buffer_size", &self.event_buffer_size)
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates settings that don't depend on bridges.
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.is_empty() {
            return Err(Error::Config("API base URL cannot be empty".to_string()));
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "API base URL must be http(s): {}",
                self.api_base_url
            )));
        }
        if let Some(dir) = &self.cache_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config("Cache directory cannot be empty".to_string()));
            }
        }
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    api_base_url: Option<String>,
    cache_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    device: Option<Arc<dyn DeviceCapabilities>>,
    registration: Option<Arc<dyn RegistrationProvider>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// If not provided, `ReqwestHttpClient` is used under `desktop-shims`.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// If not provided, `TokioFileSystem` is used under `desktop-shims`.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// If not provided, `DesktopNetworkMonitor` is used under `desktop-shims`.
    pub fn network_monitor(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    /// If not provided, `DesktopDeviceCapabilities` is used under `desktop-shims`.
    pub fn device_capabilities(mut self, device: Arc<dyn DeviceCapabilities>) -> Self {
        self.device = Some(device);
        self
    }

    /// If not provided, `ProvisionedRegistration::from_env` is used under
    /// `desktop-shims`.
    pub fn registration(mut self, registration: Arc<dyn RegistrationProvider>) -> Self {
        self.registration = Some(registration);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the configuration, failing fast on missing capabilities.
    pub fn build(self) -> Result<CoreConfig> {
        let api_base_url = self.api_base_url.ok_or_else(|| {
            Error::Config("API base URL is required. Use .api_base_url() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => defaults::http_client()?,
        };
        let file_system = match self.file_system {
            Some(fs) => fs,
            None => defaults::file_system()?,
        };
        let network = match self.network {
            Some(network) => network,
            None => defaults::network()?,
        };
        let device = match self.device {
            Some(device) => device,
            None => defaults::device(Arc::clone(&network), self.cache_dir.clone())?,
        };
        let registration = match self.registration {
            Some(registration) => registration,
            None => defaults::registration()?,
        };

        let config = CoreConfig {
            api_base_url,
            cache_dir: self.cache_dir,
            http_client,
            file_system,
            network,
            device,
            registration,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logger_sink: self.logger_sink,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "desktop-shims")]
mod defaults {
    use super::*;
    use bridge_desktop::{
        DesktopDeviceCapabilities, DesktopNetworkMonitor, ProvisionedRegistration,
        ReqwestHttpClient, TokioFileSystem,
    };

    pub(super) fn http_client() -> Result<Arc<dyn HttpClient>> {
        let client = ReqwestHttpClient::new().map_err(|e| Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: format!("Default reqwest client could not be created: {}", e),
        })?;
        Ok(Arc::new(client))
    }

    pub(super) fn file_system() -> Result<Arc<dyn FileSystemAccess>> {
        Ok(Arc::new(TokioFileSystem::new()))
    }

    pub(super) fn network() -> Result<Arc<dyn NetworkMonitor>> {
        Ok(Arc::new(DesktopNetworkMonitor::new()))
    }

    pub(super) fn device(
        network: Arc<dyn NetworkMonitor>,
        cache_dir: Option<PathBuf>,
    ) -> Result<Arc<dyn DeviceCapabilities>> {
        let storage_path = cache_dir
            .or_else(dirs_cache_dir)
            .unwrap_or_else(std::env::temp_dir);
        Ok(Arc::new(
            DesktopDeviceCapabilities::new(network).with_storage_path(storage_path),
        ))
    }

    pub(super) fn registration() -> Result<Arc<dyn RegistrationProvider>> {
        Ok(Arc::new(ProvisionedRegistration::from_env()))
    }

    fn dirs_cache_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_CACHE_HOME").map(PathBuf::from)
    }
}

#[cfg(not(feature = "desktop-shims"))]
mod defaults {
    use super::*;

    fn missing(capability: &str, hint: &str) -> Error {
        Error::CapabilityMissing {
            capability: capability.to_string(),
            message: format!(
                "No {} implementation provided. Desktop: enable the 'desktop-shims' feature. \
                 Embedded: inject {}.",
                capability, hint
            ),
        }
    }

    pub(super) fn http_client() -> Result<Arc<dyn HttpClient>> {
        Err(missing("HttpClient", "the platform HTTP stack"))
    }

    pub(super) fn file_system() -> Result<Arc<dyn FileSystemAccess>> {
        Err(missing("FileSystemAccess", "a filesystem adapter rooted in app storage"))
    }

    pub(super) fn network() -> Result<Arc<dyn NetworkMonitor>> {
        Err(missing("NetworkMonitor", "the host connectivity manager"))
    }

    pub(super) fn device(
        _network: Arc<dyn NetworkMonitor>,
        _cache_dir: Option<PathBuf>,
    ) -> Result<Arc<dyn DeviceCapabilities>> {
        Err(missing("DeviceCapabilities", "the decoder/connectivity/disk probe"))
    }

    pub(super) fn registration() -> Result<Arc<dyn RegistrationProvider>> {
        Err(missing("RegistrationProvider", "the device registration store"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::mock::{FakeDevice, FixedNetworkMonitor, MockHttpClient, StaticRegistration};
    use bridge_traits::NetworkType;

    fn injected() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(MockHttpClient::new()))
            .network_monitor(Arc::new(FixedNetworkMonitor::new(NetworkType::Ethernet)))
            .device_capabilities(Arc::new(FakeDevice::new()))
            .registration(Arc::new(StaticRegistration::registered("d1", "tok")))
    }

    fn with_fs(builder: CoreConfigBuilder) -> CoreConfigBuilder {
        builder.file_system(Arc::new(bridge_desktop::TokioFileSystem::rooted_at(
            std::env::temp_dir().join("signage-config-test"),
        )))
    }

    #[test]
    fn test_missing_base_url_is_config_error() {
        let err = with_fs(injected()).build().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("API base URL")));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = with_fs(injected())
            .api_base_url("https://signage.example.com/api/")
            .build()
            .unwrap();
        assert_eq!(config.api_base_url, "https://signage.example.com/api");
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let err = with_fs(injected())
            .api_base_url("ftp://signage.example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_event_buffer_rejected() {
        let err = with_fs(injected())
            .api_base_url("https://signage.example.com")
            .event_buffer_size(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_capability_fails_fast() {
        let err = CoreConfig::builder()
            .api_base_url("https://signage.example.com")
            .build()
            .unwrap_err();
        match err {
            Error::CapabilityMissing { capability, message } => {
                assert_eq!(capability, "HttpClient");
                assert!(message.contains("desktop-shims"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_missing_bridges() {
        let config = CoreConfig::builder()
            .api_base_url("https://signage.example.com")
            .cache_dir(std::env::temp_dir().join("signage-config-test"))
            .build()
            .expect("desktop defaults should succeed");
        assert!(config.cache_dir.is_some());
    }
}
