//! # Host Bridge Traits
//!
//! Capability contracts between the signage player core and the host platform.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Manifest fetches and streamed media downloads
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Cache directory I/O
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity and transport type
//!
//! ### Device & Identity
//! - [`DeviceCapabilities`](device::DeviceCapabilities) - Codecs, transport, free disk
//! - [`RegistrationProvider`](identity::RegistrationProvider) - Device id and auth token
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host diagnostics
//!
//! ## Fail-Fast Strategy
//!
//! The core refuses to start when a required capability is missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let http_client = builder.http_client.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "HttpClient".to_string(),
//!     message: "No HTTP client provided. Enable `desktop-shims` or inject one.".to_string(),
//! })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter instance can be
//! shared by the sync engine, the download workers, and the playlist loop.

pub mod device;
pub mod error;
pub mod http;
pub mod identity;
pub mod network;
pub mod storage;
pub mod time;

#[cfg(feature = "test-utils")]
pub mod mock;

pub use error::BridgeError;

pub use device::DeviceCapabilities;
pub use http::{HttpByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use identity::RegistrationProvider;
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
