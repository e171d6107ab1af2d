use core_content::Priority;
use std::time::Duration;

/// Sync manager configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum time between two non-forced syncs
    pub sync_interval: Duration,

    /// Ask the backend for a signed URL before each download
    pub resolve_signed_urls: bool,

    /// Queue priority for manifest downloads
    pub default_priority: Priority,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(15 * 60),
            resolve_signed_urls: false,
            default_priority: Priority::Normal,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_signed_urls(mut self, enabled: bool) -> Self {
        self.resolve_signed_urls = enabled;
        self
    }

    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sync_interval.is_zero() {
            return Err("Sync interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(SyncConfig::new()
            .with_sync_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SyncConfig::new()
            .with_default_priority(Priority::High)
            .validate()
            .is_ok());
    }
}
