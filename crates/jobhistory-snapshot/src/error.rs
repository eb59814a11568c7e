//! Snapshot error types.

use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Requested snapshot, timestamp or content file is absent.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// A metadata file is missing or could not be parsed.
    #[error("Corrupt snapshot metadata at {path}: {message}")]
    CorruptMetadata { path: String, message: String },

    /// The timestamp directory was already claimed by another writer.
    #[error("Snapshot directory already exists: {0}")]
    WriteCollision(String),

    /// A snapshot could not be written.
    #[error("Failed to write snapshot: {0}")]
    WriteFailed(String),

    /// Entity identifier cannot be mapped onto a history directory.
    #[error("Invalid entity identifier: {0}")]
    InvalidEntity(String),

    /// Timestamp string does not match `YYYY-MM-DD_HH-mm-ss`.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a corrupt metadata error.
    pub fn corrupt_metadata(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a write failed error.
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed(message.into())
    }

    /// Whether this error means the requested item does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
