//! Error types for lockwatch-core operations.

use std::path::PathBuf;

/// All errors that can occur in lockwatch-core operations.
///
/// Nothing in the attempt-detection path returns this type: classification and
/// tracking degrade to "no attempt recorded" instead of failing. Errors only
/// come out of storage and configuration.
#[derive(Debug, thiserror::Error)]
pub enum LockwatchError {
    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl LockwatchError {
    pub(crate) fn storage(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let context = context.into();
        move |source| LockwatchError::Storage { context, source }
    }
}

/// Convenience type alias for Results using LockwatchError.
pub type Result<T> = std::result::Result<T, LockwatchError>;

// Conversion for string error compatibility
impl From<LockwatchError> for String {
    fn from(err: LockwatchError) -> String {
        err.to_string()
    }
}
