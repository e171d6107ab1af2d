use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("Recovery already in progress")]
    RecoveryInProgress,

    #[error("Invalid health configuration: {0}")]
    InvalidConfig(String),
}

impl HealthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HealthError::RecoveryInProgress)
    }
}

pub type Result<T> = std::result::Result<T, HealthError>;
