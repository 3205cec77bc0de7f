//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::AssetUrl;
use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No entry is stored under the key.
    #[display("entry not found: {_0}")]
    NotFound(#[error(not(source))] AssetUrl),
    /// Key is empty or contains whitespace/control characters.
    #[display("invalid key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The storage subsystem itself is inoperable (missing root, read-only
    /// filesystem, disk full, closed database). Nothing written now will stick.
    #[display("storage unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// An entry exists but its metadata or blob can't be trusted.
    #[display("corrupt entry: {_0}")]
    Corrupt(#[error(not(source))] AssetUrl),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_) | Self::BackendError(_))
    }

    /// Returns `true` if the whole store is out of action, as opposed to a
    /// single entry failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
