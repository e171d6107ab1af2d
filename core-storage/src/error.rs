use bridge_traits::BridgeError;
use core_content::ContentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Insufficient storage: required {required} bytes, available {available} bytes")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("Checksum mismatch for {content_id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        content_id: ContentId,
        expected: String,
        actual: String,
    },

    #[error("Cache entry not found: {0}")]
    NotFound(ContentId),

    #[error("Cache entry is pinned: {0}")]
    Pinned(ContentId),

    #[error("Storage not initialized")]
    NotInitialized,

    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl StorageError {
    /// Insufficient space may clear after eviction; I/O hiccups may clear on
    /// retry. A checksum mismatch is retried once by the downloader, not here.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InsufficientSpace { .. } | Self::Io(_) => true,
            Self::Bridge(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
