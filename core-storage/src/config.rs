//! Storage configuration and tier policy

pub const MB: u64 = 1024 * 1024;
pub const GB: u64 = 1024 * MB;

/// Configuration for the storage manager.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory name under the host cache directory (default: "content")
    pub cache_directory: String,

    /// Cache size budget in bytes (default: 8GB)
    pub max_cache_bytes: u64,

    /// Above this many available bytes storage is HEALTHY (default: 500MB)
    pub healthy_threshold_bytes: u64,

    /// Below this many available bytes storage is CRITICAL (default: 100MB)
    pub critical_threshold_bytes: u64,

    /// Space multiplier required for new downloads while HEALTHY (default: 1.1)
    pub healthy_buffer_multiplier: f64,

    /// Space multiplier required for new downloads while WARNING (default: 1.5)
    pub warning_buffer_multiplier: f64,

    /// Treat files whose item carries no checksum as verified (default: true)
    pub allow_unverified: bool,

    /// Read/write chunk size for hashing and copying (default: 64KiB)
    pub chunk_size: usize,

    /// Persist the index next to the cached files (default: true)
    pub persist_index: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_directory: "content".to_string(),
            max_cache_bytes: 8 * GB,
            healthy_threshold_bytes: 500 * MB,
            critical_threshold_bytes: 100 * MB,
            healthy_buffer_multiplier: 1.1,
            warning_buffer_multiplier: 1.5,
            allow_unverified: true,
            chunk_size: 64 * 1024,
            persist_index: true,
        }
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_directory(mut self, name: impl Into<String>) -> Self {
        self.cache_directory = name.into();
        self
    }

    pub fn with_max_cache_bytes(mut self, bytes: u64) -> Self {
        self.max_cache_bytes = bytes;
        self
    }

    pub fn with_thresholds(mut self, healthy_bytes: u64, critical_bytes: u64) -> Self {
        self.healthy_threshold_bytes = healthy_bytes;
        self.critical_threshold_bytes = critical_bytes;
        self
    }

    pub fn with_buffer_multipliers(mut self, healthy: f64, warning: f64) -> Self {
        self.healthy_buffer_multiplier = healthy;
        self.warning_buffer_multiplier = warning;
        self
    }

    pub fn with_allow_unverified(mut self, allow: bool) -> Self {
        self.allow_unverified = allow;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_persist_index(mut self, persist: bool) -> Self {
        self.persist_index = persist;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_directory.trim().is_empty() {
            return Err("Cache directory name cannot be empty".to_string());
        }
        if self.cache_directory.contains(['/', '\\']) || self.cache_directory == ".." {
            return Err("Cache directory must be a single path component".to_string());
        }
        if self.max_cache_bytes == 0 {
            return Err("Cache size budget must be greater than 0".to_string());
        }
        if self.critical_threshold_bytes > self.healthy_threshold_bytes {
            return Err("Critical threshold cannot exceed healthy threshold".to_string());
        }
        if self.healthy_buffer_multiplier < 1.0 || self.warning_buffer_multiplier < 1.0 {
            return Err("Buffer multipliers must be at least 1.0".to_string());
        }
        if self.chunk_size == 0 {
            return Err("Chunk size must be greater than 0".to_string());
        }
        Ok(())
    }
}
