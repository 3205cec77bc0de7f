//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A config error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A source couldn't be read or didn't match the expected shape.
    #[display("failed to load configuration")]
    Load,
    /// The merged configuration is inconsistent.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No storage path was configured and the platform has no data directory.
    #[display("no data directory available; set storage.path")]
    NoDataDir,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
