//! Network Monitoring Abstraction
//!
//! Transport type drives the download throttle rate; connectivity drives the
//! health check and the wait-for-network recovery action.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Network transport the device is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkType {
    Wifi,
    Ethernet,
    Mobile,
    /// No usable connection.
    None,
}

impl NetworkType {
    pub fn is_connected(&self) -> bool {
        !matches!(self, NetworkType::None)
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkType::Wifi => "WIFI",
            NetworkType::Ethernet => "ETHERNET",
            NetworkType::Mobile => "MOBILE",
            NetworkType::None => "NONE",
        };
        f.write_str(name)
    }
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: NetworkType,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
}

impl NetworkInfo {
    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: NetworkType::None,
            is_metered: false,
        }
    }

    /// Transport type, collapsed to `None` unless the link is up.
    pub fn effective_type(&self) -> NetworkType {
        match self.status {
            NetworkStatus::Connected => self.network_type,
            _ => NetworkType::None,
        }
    }
}

/// Network monitor trait
///
/// # Platform Support
///
/// - **Desktop**: reachability probe (see `bridge-desktop`)
/// - **Embedded players**: connectivity manager of the host OS
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }
}
