//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::time::Duration;
use tracing::debug;

/// Desktop network monitor implementation
///
/// Reachability is a TCP connect to a well-known resolver. Desktop platforms
/// don't expose the link type without OS-specific APIs, so a connected link is
/// reported as the configured `assumed_type` (Ethernet by default).
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    probe_timeout: Duration,
    assumed_type: NetworkType,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self {
            probe_addr: "8.8.8.8:53".to_string(),
            probe_timeout: Duration::from_secs(5),
            assumed_type: NetworkType::Ethernet,
        }
    }

    pub fn with_probe(mut self, addr: impl Into<String>, timeout: Duration) -> Self {
        self.probe_addr = addr.into();
        self.probe_timeout = timeout;
        self
    }

    /// Transport reported while connected (e.g. `Wifi` for wireless kiosks).
    pub fn with_assumed_type(mut self, network_type: NetworkType) -> Self {
        self.assumed_type = network_type;
        self
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.probe_timeout,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, probe = %self.probe_addr, "Network probe finished");

        Ok(NetworkInfo {
            status,
            network_type: if status == NetworkStatus::Connected {
                self.assumed_type
            } else {
                NetworkType::None
            },
            is_metered: matches!(self.assumed_type, NetworkType::Mobile),
        })
    }
}
