//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Passes and routed requests keep the
//! error types of their own crates; these only cover assembling an engine.

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine assembly.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    /// A cache backend couldn't be opened.
    #[display("storage error")]
    Storage,
    #[display("HTTP client error")]
    Http,
    /// The configured catalog is invalid.
    #[display("catalog error")]
    Catalog,
    /// A configured URL can't be used as a key or route.
    #[display("invalid URL in configuration: {_0}")]
    InvalidUrl(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
