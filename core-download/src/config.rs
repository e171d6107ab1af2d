//! Download configuration

use bridge_traits::NetworkType;
use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;

/// Headroom over the nominal transfer time before a transfer times out
const TRANSFER_TIME_FACTOR: u32 = 2;

/// Configuration for the download manager.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Concurrent download workers (default: 1)
    pub worker_count: usize,

    /// Bytes read and written per chunk (default: 64KiB)
    pub chunk_size: usize,

    /// Throttle rate on Wi-Fi in bytes/sec (default: 5MB/s)
    pub wifi_rate: u64,

    /// Throttle rate on Ethernet in bytes/sec (default: 10MB/s)
    pub ethernet_rate: u64,

    /// Throttle rate on mobile data in bytes/sec (default: 512KB/s)
    pub mobile_rate: u64,

    /// Attempts per request for retryable network errors (default: 3)
    pub max_attempts: u32,

    /// First retry delay; doubles per attempt (default: 1s)
    pub backoff_base: Duration,

    /// Retry delay cap (default: 30s)
    pub backoff_max: Duration,

    /// Whole-transfer timeout floor (default: 30min). Items whose size at
    /// the current rate needs longer get twice their nominal transfer time.
    pub download_timeout: Duration,

    /// Longest wait for the next chunk before the transfer counts as stalled (default: 60s)
    pub stall_timeout: Duration,

    /// Minimum gap between progress updates (default: 250ms)
    pub progress_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            chunk_size: 64 * 1024,
            wifi_rate: 5 * MB,
            ethernet_rate: 10 * MB,
            mobile_rate: 512 * KB,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            download_timeout: Duration::from_secs(30 * 60),
            stall_timeout: Duration::from_secs(60),
            progress_interval: Duration::from_millis(250),
        }
    }
}

impl DownloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_rates(mut self, wifi: u64, ethernet: u64, mobile: u64) -> Self {
        self.wifi_rate = wifi;
        self.ethernet_rate = ethernet;
        self.mobile_rate = mobile;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Throttle rate for a transport; 0 means no network.
    pub fn rate_for(&self, network: NetworkType) -> u64 {
        match network {
            NetworkType::Wifi => self.wifi_rate,
            NetworkType::Ethernet => self.ethernet_rate,
            NetworkType::Mobile => self.mobile_rate,
            NetworkType::None => 0,
        }
    }

    /// Deadline for one transfer of `size` bytes at `rate` bytes/sec.
    ///
    /// Unknown sizes get the plain `download_timeout`.
    pub fn transfer_deadline(&self, size: u64, rate: u64) -> Duration {
        if size == 0 || rate == 0 {
            return self.download_timeout;
        }
        let nominal = Duration::from_secs_f64(size as f64 / rate as f64);
        self.download_timeout
            .max(nominal.saturating_mul(TRANSFER_TIME_FACTOR))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("Worker count must be at least 1".to_string());
        }
        if self.chunk_size == 0 {
            return Err("Chunk size must be greater than 0".to_string());
        }
        if self.wifi_rate == 0 || self.ethernet_rate == 0 || self.mobile_rate == 0 {
            return Err("Throttle rates must be greater than 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("Max attempts must be at least 1".to_string());
        }
        if self.download_timeout.is_zero() || self.stall_timeout.is_zero() {
            return Err("Timeouts must be greater than 0".to_string());
        }
        Ok(())
    }
}
