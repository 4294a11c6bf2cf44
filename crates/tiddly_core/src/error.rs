use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Unified error type for tiddly operations
#[derive(Debug, Error)]
pub enum TiddlyError {
    // Lookup errors
    #[error("Tiddler not found: '{0}'")]
    NotFound(String),

    // Request errors
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Precondition failed for '{title}': expected revision {expected}, found {actual}")]
    PreconditionFailed {
        title: String,
        expected: u64,
        actual: u64,
    },

    // Storage errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Concurrent write to '{title}': expected revision {expected}, found {actual}")]
    RevisionConflict {
        title: String,
        expected: u64,
        actual: u64,
    },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Mirror errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Remote rejected push of '{reference}': {message}")]
    PushRejected { reference: String, message: String },

    #[error("Mirror run exceeded its {0:?} time limit")]
    Timeout(Duration),
}

/// Result type alias for tiddly operations
pub type Result<T> = std::result::Result<T, TiddlyError>;

/// Coarse classification of a [`TiddlyError`], used by callers to pick a
/// response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested title has no current record.
    NotFound,
    /// The caller sent something unusable.
    BadRequest,
    /// A conditional write did not match the current revision.
    Conflict,
    /// Storage or repository failure.
    Internal,
}

impl TiddlyError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TiddlyError::NotFound(_) => ErrorKind::NotFound,
            TiddlyError::BadRequest(_) => ErrorKind::BadRequest,
            TiddlyError::PreconditionFailed { .. } => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether running the same operation again may succeed without any
    /// change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        match self {
            TiddlyError::Timeout(_) | TiddlyError::RevisionConflict { .. } => true,
            TiddlyError::Git(e) => matches!(
                e.class(),
                git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssl
            ),
            _ => false,
        }
    }
}
