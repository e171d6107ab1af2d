//! Device Capability Abstraction
//!
//! Answers the questions the download admission checks ask: which codecs the
//! decoder supports, which transport is active, and how much disk is free.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::network::NetworkType;

/// Device capability provider
///
/// Codec names are compared case-insensitively by callers; implementations
/// should report them lower-case (`"h264"`, `"vp9"`, `"aac"`).
#[async_trait]
pub trait DeviceCapabilities: Send + Sync {
    /// Codecs the device can decode.
    async fn supported_codecs(&self) -> HashSet<String>;

    /// Transport currently in use, `NetworkType::None` when offline.
    async fn current_network_type(&self) -> NetworkType;

    /// Free bytes on the volume holding the cache directory.
    async fn free_storage_bytes(&self) -> Result<u64>;
}

/// Returns the subset of `required` the device cannot decode.
pub fn missing_codecs(required: &[String], supported: &HashSet<String>) -> Vec<String> {
    required
        .iter()
        .filter(|codec| !supported.contains(&codec.to_ascii_lowercase()))
        .cloned()
        .collect()
}
