//! Router Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A router error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request URL couldn't be parsed or used as a cache key.
    #[display("invalid request: {_0}")]
    InvalidRequest(#[error(not(source))] String),
    /// Neither the network nor the cache could answer.
    #[display("resource unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
