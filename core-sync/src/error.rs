use bridge_traits::BridgeError;
use core_content::ContentError;
use core_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Sync already in progress")]
    InProgress,

    #[error("Sync not due for another {0:?}")]
    NotDue(Duration),

    #[error("Device is not registered")]
    Unregistered,

    #[error("Manifest fetch failed: {message}")]
    ManifestFetch { message: String, retryable: bool },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Insufficient storage: required {required} bytes, available {available} bytes")]
    InsufficientStorage { required: u64, available: u64 },

    #[error("Storage error: {message}")]
    Storage { message: String, retryable: bool },

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ManifestFetch { retryable, .. } | SyncError::Storage { retryable, .. } => {
                *retryable
            }
            SyncError::InsufficientStorage { .. } | SyncError::Cancelled => true,
            SyncError::InProgress | SyncError::NotDue(_) => true,
            SyncError::Unregistered | SyncError::InvalidManifest(_) => false,
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(e: BridgeError) -> Self {
        SyncError::ManifestFetch {
            retryable: e.is_retryable(),
            message: e.to_string(),
        }
    }
}

impl From<ContentError> for SyncError {
    fn from(e: ContentError) -> Self {
        SyncError::InvalidManifest(e.to_string())
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InsufficientSpace {
                required,
                available,
            } => SyncError::InsufficientStorage {
                required,
                available,
            },
            other => SyncError::Storage {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
