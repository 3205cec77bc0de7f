//! Fetch Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection refused, DNS failure, reset; most likely offline.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The configured client timeout elapsed.
    #[display("request timed out")]
    Timeout,
    /// The origin answered with a non-2xx status.
    #[display("unexpected HTTP status {_0}")]
    Status(#[error(not(source))] u16),
    /// The URL couldn't be turned into a request.
    #[display("invalid request URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// The response body was cut short.
    #[display("failed to read response body")]
    Body,
    /// The HTTP client could not be constructed.
    #[display("HTTP client configuration error")]
    Client,
    /// The cache refused writes altogether; the batch was abandoned.
    #[display("content cache unavailable")]
    CacheUnavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::Body | Self::CacheUnavailable => true,
            Self::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            Self::InvalidUrl(_) | Self::Client => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Network("connection refused".to_string()), true)]
    #[case(ErrorKind::Timeout, true)]
    #[case(ErrorKind::Status(503), true)]
    #[case(ErrorKind::Status(429), true)]
    #[case(ErrorKind::Status(404), false)]
    #[case(ErrorKind::InvalidUrl("nope".to_string()), false)]
    fn error_kind_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Status(404).to_string(), "unexpected HTTP status 404");
        assert_eq!(ErrorKind::Timeout.to_string(), "request timed out");
    }
}
