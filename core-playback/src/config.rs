//! # Playback Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playlist scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Hold time for items whose duration is zero or negative.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_item_duration")]
    pub default_item_duration: Duration,

    /// Play an uncached item straight from its source URL.
    ///
    /// When disabled, uncached items are skipped until the cache has them.
    ///
    /// Default: true.
    #[serde(default = "default_remote_fallback")]
    pub remote_fallback: bool,

    /// Capacity of the playback-advance broadcast channel.
    ///
    /// Default: 32.
    #[serde(default = "default_advance_buffer")]
    pub advance_buffer: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_item_duration: default_item_duration(),
            remote_fallback: default_remote_fallback(),
            advance_buffer: default_advance_buffer(),
        }
    }
}

impl PlaybackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_item_duration(mut self, duration: Duration) -> Self {
        self.default_item_duration = duration;
        self
    }

    pub fn with_remote_fallback(mut self, enabled: bool) -> Self {
        self.remote_fallback = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_item_duration.is_zero() {
            return Err("default_item_duration must be > 0".to_string());
        }

        if self.advance_buffer == 0 {
            return Err("advance_buffer must be > 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_item_duration() -> Duration {
    Duration::from_secs(5)
}

fn default_remote_fallback() -> bool {
    true
}

fn default_advance_buffer() -> usize {
    32
}
