//! Custom error types for the re-dating engine.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedateError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient connectivity failure (timeout, reset, unreachable share).
    /// The only retryable variant.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Timestamp {0} is outside the range the share protocol can store")]
    UnsupportedTimestamp(DateTime<Utc>),

    #[error("Verification mismatch on {path}: requested {requested}, share reports {actual}")]
    VerificationMismatch {
        path: PathBuf,
        requested: DateTime<Utc>,
        actual: DateTime<Utc>,
    },

    /// Restoring original timestamps failed. The file may be in an
    /// inconsistent state; surfaced prominently and never auto-retried.
    #[error("Restore failed for {path}: {reason}")]
    Restore { path: PathBuf, reason: String },

    /// A write/verify failure whose rollback also failed. Carries both
    /// errors so neither is swallowed.
    #[error("Rollback failed after error ({original}); restore error: {restore}")]
    RollbackFailed {
        original: Box<RedateError>,
        restore: Box<RedateError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RedateError {
    /// True for failures the retry policy may re-attempt. Everything else
    /// terminates the transaction on first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout(_))
    }

    /// True when the file may have been left in an inconsistent state and
    /// manual intervention is required.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Restore { .. } | Self::RollbackFailed { .. })
    }

    /// Classify a raw I/O error from the share mount into the taxonomy.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => {
                Self::Connectivity(format!("{}: {}", path.display(), err))
            }
            _ => Self::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, RedateError>;
