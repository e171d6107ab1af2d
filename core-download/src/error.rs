use bridge_traits::BridgeError;
use core_content::ContentId;
use core_storage::StorageError;
use thiserror::Error;

/// Download failures.
///
/// Cloneable so one terminal result can be handed to every waiter of the
/// same content id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("No network connection")]
    NoNetwork,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Transfer stalled for {0:?}")]
    Stalled(std::time::Duration),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Insufficient storage: required {required} bytes, available {available} bytes")]
    InsufficientStorage { required: u64, available: u64 },

    #[error("Unsupported codecs: {}", .missing.join(", "))]
    CodecUnsupported { missing: Vec<String> },

    #[error("Storage error: {message}")]
    Storage { message: String, retryable: bool },

    #[error("cancelled")]
    Cancelled,

    #[error("Nothing to retry for {0}")]
    NotRetryable(ContentId),

    #[error("Download manager shut down")]
    ShutDown,

    #[error("Invalid download configuration: {0}")]
    Config(String),
}

impl DownloadError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoNetwork | Self::Network(_) | Self::Timeout(_) | Self::Stalled(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Storage { retryable, .. } => *retryable,
            Self::Cancelled => true,
            Self::ChecksumMismatch { .. }
            | Self::InsufficientStorage { .. }
            | Self::CodecUnsupported { .. }
            | Self::NotRetryable(_)
            | Self::ShutDown
            | Self::Config(_) => false,
        }
    }
}

impl From<BridgeError> for DownloadError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::HttpStatus { status, url } => Self::HttpStatus { status, url },
            BridgeError::Timeout(message) => Self::Timeout(message),
            BridgeError::Network(message) => Self::Network(message),
            BridgeError::Io(e) => Self::Network(e.to_string()),
            other => Self::Network(other.to_string()),
        }
    }
}

impl From<StorageError> for DownloadError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ChecksumMismatch {
                expected, actual, ..
            } => Self::ChecksumMismatch { expected, actual },
            StorageError::InsufficientSpace {
                required,
                available,
            } => Self::InsufficientStorage {
                required,
                available,
            },
            other => Self::Storage {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
