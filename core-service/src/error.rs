use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] core_storage::StorageError),

    #[error("Download error: {0}")]
    Download(#[from] core_download::DownloadError),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Health error: {0}")]
    Health(#[from] core_health::HealthError),
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::InitializationFailed(_) | CoreError::Runtime(_) => false,
            CoreError::Storage(e) => e.is_retryable(),
            CoreError::Download(e) => e.is_retryable(),
            CoreError::Cache(e) => e.is_retryable(),
            CoreError::Sync(e) => e.is_retryable(),
            CoreError::Playback(e) => e.is_retryable(),
            CoreError::Health(e) => e.is_retryable(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_follows_inner_error() {
        assert!(CoreError::from(core_sync::SyncError::InProgress).is_retryable());
        assert!(!CoreError::from(core_sync::SyncError::Unregistered).is_retryable());
        assert!(!CoreError::InitializationFailed("boom".into()).is_retryable());
    }
}
