//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop-class players
//! (Linux boxes, mini PCs, macOS/Windows kiosks):
//! - `HttpClient` using `reqwest`
//! - `FileSystemAccess` using `tokio::fs`
//! - `NetworkMonitor` using a TCP reachability probe
//! - `DeviceCapabilities` using `sysinfo` for free disk space
//! - `RegistrationProvider` backed by a provisioned id/token pair
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopDeviceCapabilities, DesktopNetworkMonitor, ReqwestHttpClient, TokioFileSystem};
//! use std::sync::Arc;
//!
//! let fs = TokioFileSystem::new();
//! let http = ReqwestHttpClient::new()?;
//! let device = DesktopDeviceCapabilities::new(Arc::new(DesktopNetworkMonitor::new()));
//! ```

mod device;
mod filesystem;
mod http;
mod network;
mod registration;

pub use device::DesktopDeviceCapabilities;
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;
pub use registration::ProvisionedRegistration;
