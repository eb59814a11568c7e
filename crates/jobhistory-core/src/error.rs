//! Error types for the core crate.

use jobhistory_snapshot::SnapshotError;
use thiserror::Error;

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors surfaced by the history facade.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The caller may not configure the entity.
    #[error("access denied: {caller} lacks configure permission on {entity}")]
    AccessDenied { caller: String, entity: String },

    /// The live configuration could not be replaced during a restore.
    #[error("failed to apply configuration to {entity}: {message}")]
    ApplyFailed { entity: String, message: String },

    /// A restore was applied but its history entry could not be written.
    #[error(
        "{entity} was restored from {restored_from} but the restore was not recorded: {source}"
    )]
    RestoreNotRecorded {
        entity: String,
        restored_from: String,
        #[source]
        source: SnapshotError,
    },

    /// The request does not carry what the operation needs.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Snapshot storage error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    /// Create an access denied error.
    pub fn access_denied(caller: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::AccessDenied {
            caller: caller.into(),
            entity: entity.into(),
        }
    }

    /// Whether the requested snapshot does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Snapshot(e) if e.is_not_found())
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    /// File reference not found during substitution.
    #[error("file reference not found: {path}")]
    FileRefNotFound { path: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
