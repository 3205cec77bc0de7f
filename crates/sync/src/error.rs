//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Only conditions fatal to a whole pass
//! are errors; per-asset failures are recorded in the
//! [`SyncReport`](crate::SyncReport) instead.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Neither a fresh nor a cached manifest could be obtained.
    #[display("manifest unavailable")]
    ManifestUnavailable,
    /// The cache can't be written to or listed; nothing was evicted.
    #[display("content cache unavailable")]
    CacheUnavailable,
    /// Another pass is still running on this synchronizer.
    #[display("synchronization already running")]
    AlreadyRunning,
    /// The base URLs can't produce a usable desired set.
    #[display("invalid synchronization target")]
    InvalidTarget,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ManifestUnavailable | Self::CacheUnavailable | Self::AlreadyRunning)
    }
}
