//! Device capabilities for desktop players.

use async_trait::async_trait;
use bridge_traits::{
    device::DeviceCapabilities,
    error::{BridgeError, Result},
    network::{NetworkMonitor, NetworkType},
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysinfo::Disks;
use tracing::{debug, warn};

/// Codecs a stock desktop decoder stack handles.
const DEFAULT_CODECS: &[&str] = &["h264", "vp8", "vp9", "av1", "aac", "mp3", "opus", "jpeg", "png", "webp"];

/// `DeviceCapabilities` backed by `sysinfo` and a `NetworkMonitor`.
pub struct DesktopDeviceCapabilities {
    network: Arc<dyn NetworkMonitor>,
    codecs: HashSet<String>,
    storage_path: PathBuf,
}

impl DesktopDeviceCapabilities {
    pub fn new(network: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            network,
            codecs: DEFAULT_CODECS.iter().map(|c| c.to_string()).collect(),
            storage_path: std::env::temp_dir(),
        }
    }

    pub fn with_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codecs = codecs
            .into_iter()
            .map(|c| c.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Path whose volume is measured for free space (the cache directory).
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Available bytes on the disk with the longest mount point prefixing `path`.
    fn available_space_for(path: &Path) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

#[async_trait]
impl DeviceCapabilities for DesktopDeviceCapabilities {
    async fn supported_codecs(&self) -> HashSet<String> {
        self.codecs.clone()
    }

    async fn current_network_type(&self) -> NetworkType {
        match self.network.get_network_info().await {
            Ok(info) => info.effective_type(),
            Err(e) => {
                warn!(error = %e, "Network probe failed, treating as offline");
                NetworkType::None
            }
        }
    }

    async fn free_storage_bytes(&self) -> Result<u64> {
        let path = self.storage_path.clone();
        let available = core_async::task::spawn_blocking(move || Self::available_space_for(&path))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("disk probe panicked: {}", e)))?;

        match available {
            Some(bytes) => {
                debug!(path = ?self.storage_path, available = bytes, "Disk space probed");
                Ok(bytes)
            }
            None => Err(BridgeError::NotAvailable(format!(
                "no disk found for {}",
                self.storage_path.display()
            ))),
        }
    }
}
