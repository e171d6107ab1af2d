use core_content::ContentError;
use core_download::DownloadError;
use core_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Invalid media item: {0}")]
    InvalidItem(#[from] ContentError),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Storage error: {message}")]
    Storage { message: String, retryable: bool },
}

impl CacheError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::Download(e) => e.is_retryable(),
            CacheError::Storage { retryable, .. } => *retryable,
            CacheError::InvalidItem(_) => false,
        }
    }

    /// Whether the item's bytes failed checksum validation.
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, CacheError::Download(DownloadError::ChecksumMismatch { .. }))
    }
}

impl From<StorageError> for CacheError {
    fn from(e: StorageError) -> Self {
        CacheError::Storage {
            retryable: e.is_retryable(),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
