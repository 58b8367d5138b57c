use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid image: {message}")]
    InvalidImage { message: String },

    #[error("Invalid argument: {message}")]
    Argument { message: String },

    #[error("{what} does not exist: {}", path.display())]
    StorageUnavailable { what: &'static str, path: PathBuf },

    #[error("Database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Duplicate group {owner}/{filename} left for retry: {reason}")]
    DuplicateGroupConflict {
        owner: String,
        filename: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    Decode(#[from] image::ImageError),
}

impl EngineError {
    pub(crate) fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
        }
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
