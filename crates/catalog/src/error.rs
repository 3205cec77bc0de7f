//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A book entry is malformed (empty name/prefix, zero chapters).
    #[display("invalid book entry: {_0}")]
    InvalidBook(#[error(not(source))] String),
    /// Padding width too narrow for the book's chapter count.
    #[display("padding width {width} cannot hold {chapters} chapters")]
    InvalidWidth { width: u8, chapters: u16 },
    /// Two books share an audio prefix, so their URLs would collide.
    #[display("duplicate audio prefix: {_0}")]
    DuplicatePrefix(#[error(not(source))] String),
    /// A base URL is empty or not usable as a key prefix.
    #[display("invalid base URL: {_0:?}")]
    InvalidBase(#[error(not(source))] String),
    /// Audio and video bases are identical; the two namespaces must not overlap.
    #[display("audio and video base URLs must differ: {_0}")]
    NamespaceCollision(#[error(not(source))] String),
    /// Manifest document could not be decoded.
    #[display("invalid manifest document")]
    InvalidManifest,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
