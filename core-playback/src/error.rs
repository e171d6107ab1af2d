//! # Playback Error Types

use thiserror::Error;

/// Errors returned by the playlist scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// No playlist is loaded, or the loaded one is empty.
    #[error("Nothing is playing")]
    NothingPlaying,

    /// Configuration rejected by `PlaybackConfig::validate`.
    #[error("Invalid playback configuration: {0}")]
    InvalidConfig(String),
}

impl PlaybackError {
    /// Returns `true` if the operation may succeed later without a config change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlaybackError::NothingPlaying)
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
