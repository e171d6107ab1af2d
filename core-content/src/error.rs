use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid item {id}: {reason}")]
    InvalidItem { id: String, reason: String },

    #[error("Unknown media type: {0}")]
    UnknownMediaType(String),
}

pub type Result<T> = std::result::Result<T, ContentError>;
