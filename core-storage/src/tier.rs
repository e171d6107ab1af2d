//! Storage tiers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::StorageConfig;

/// Free-space tier, classified from available bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageTier {
    /// More than the healthy threshold available
    Healthy,
    /// Between the critical and healthy thresholds
    Warning,
    /// Below the critical threshold; new downloads are refused
    Critical,
}

impl StorageTier {
    pub fn classify(available_bytes: u64, config: &StorageConfig) -> Self {
        if available_bytes > config.healthy_threshold_bytes {
            Self::Healthy
        } else if available_bytes >= config.critical_threshold_bytes {
            Self::Warning
        } else {
            Self::Critical
        }
    }

    /// Bytes that must be available to admit a download of `required` bytes,
    /// or `None` when the tier refuses new downloads.
    pub fn required_with_buffer(&self, required: u64, config: &StorageConfig) -> Option<u64> {
        let multiplier = match self {
            Self::Healthy => config.healthy_buffer_multiplier,
            Self::Warning => config.warning_buffer_multiplier,
            Self::Critical => return None,
        };
        Some((required as f64 * multiplier).ceil() as u64)
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "HEALTHY",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MB;

    #[test]
    fn test_tier_boundaries() {
        let config = StorageConfig::default();
        assert_eq!(StorageTier::classify(501 * MB, &config), StorageTier::Healthy);
        assert_eq!(StorageTier::classify(500 * MB, &config), StorageTier::Warning);
        assert_eq!(StorageTier::classify(100 * MB, &config), StorageTier::Warning);
        assert_eq!(StorageTier::classify(100 * MB - 1, &config), StorageTier::Critical);
    }

    #[test]
    fn test_buffer_multipliers() {
        let config = StorageConfig::default();
        assert_eq!(
            StorageTier::Healthy.required_with_buffer(100, &config),
            Some(110)
        );
        assert_eq!(
            StorageTier::Warning.required_with_buffer(100, &config),
            Some(150)
        );
        assert_eq!(StorageTier::Critical.required_with_buffer(100, &config), None);
    }
}
