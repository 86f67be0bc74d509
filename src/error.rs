use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Model not found: {name}")]
    NotFound { name: String },

    #[error("Download of {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("Integrity check failed for model {name}: expected sha256 {expected}, got {actual}")]
    Integrity {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt model artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Model parameters do not match definition: {0}")]
    ModelMismatch(String),

    #[error("Input shape mismatch: {0}")]
    Shape(String),

    #[error("Failed to read input array {}: {message}", path.display())]
    Input { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Compute device unavailable: {0}")]
    Device(String),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn network(url: &str, message: impl ToString) -> Self {
        Self::Network {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}
