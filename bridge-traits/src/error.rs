use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Network unavailable: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure is a transport problem that a later attempt may not hit.
    ///
    /// 4xx responses other than 408/429 are reported as permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Network(_) | BridgeError::Timeout(_) => true,
            BridgeError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            BridgeError::Io(_) => true,
            BridgeError::NotAvailable(_) | BridgeError::OperationFailed(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
