//! Error types for cairn-db-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
///
/// Variants are ordered roughly from most to least local. No component
/// retries internally; partial work is simply never referenced by a root,
/// so failed writes leave only unreachable garbage behind.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed JSON in an input buffer, with the byte offset of the
    /// first offending byte.
    #[error("parse error at byte {offset}: {msg}")]
    Parse { offset: usize, msg: String },

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A cursor's backing tree is no longer readable
    #[error("Cursor invalidated: {0}")]
    CursorInvalidated(String),

    /// An internal precondition was violated; not recoverable
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// JSON (de)serialization error (serde_json)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a parse error at a byte offset
    pub fn parse(offset: usize, msg: impl Into<String>) -> Self {
        Error::Parse {
            offset,
            msg: msg.into(),
        }
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a cursor invalidation error
    pub fn cursor_invalidated(msg: impl Into<String>) -> Self {
        Error::CursorInvalidated(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
