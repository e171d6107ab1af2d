use core_storage::MB;
use std::time::Duration;

/// Health monitor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Period of the background health loop
    pub check_interval: Duration,

    /// Connectivity polls while waiting for the network during recovery
    pub network_wait_retries: u32,

    /// Fixed delay between connectivity polls
    pub network_wait_delay: Duration,

    /// Free space the forced eviction aims for
    pub eviction_target_bytes: u64,

    /// First delay of the recovery backoff suggestion
    pub recovery_backoff_base: Duration,

    /// Upper bound of the recovery backoff suggestion
    pub recovery_backoff_max: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            network_wait_retries: 5,
            network_wait_delay: Duration::from_secs(10),
            eviction_target_bytes: 500 * MB,
            recovery_backoff_base: Duration::from_secs(30),
            recovery_backoff_max: Duration::from_secs(30 * 60),
        }
    }
}

impl HealthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_network_wait(mut self, retries: u32, delay: Duration) -> Self {
        self.network_wait_retries = retries;
        self.network_wait_delay = delay;
        self
    }

    pub fn with_eviction_target(mut self, bytes: u64) -> Self {
        self.eviction_target_bytes = bytes;
        self
    }

    pub fn with_recovery_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.recovery_backoff_base = base;
        self.recovery_backoff_max = max;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.check_interval.is_zero() {
            return Err("Health check interval must be greater than 0".to_string());
        }
        if self.recovery_backoff_base > self.recovery_backoff_max {
            return Err("Recovery backoff base cannot exceed its maximum".to_string());
        }
        Ok(())
    }
}
