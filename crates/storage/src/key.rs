//! Cache key validation.
//!
//! Every cached blob is addressed by the URL it was fetched from. Keys are
//! compared as plain strings: two keys are equal iff their strings are equal.
//! Nothing is normalized, so `https://a/b` and `https://a//b` are different
//! entries.

use crate::error::{Error, ErrorKind, Result};
use std::borrow::Borrow;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// A validated cache key, usually the absolute URL of a remote asset.
///
/// # Examples
///
/// ```
/// use chorale_storage::AssetUrl;
/// // Valid keys
/// assert!(AssetUrl::new("https://media.example.org/audio/PSA_150.mp3").is_ok());
/// assert!(AssetUrl::new("hymns-manifest").is_ok());
/// // Invalid keys
/// assert!(AssetUrl::new("").is_err());
/// assert!(AssetUrl::new("https://media.example.org/two words.mp4").is_err());
/// assert!(AssetUrl::new("line\nbreak").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetUrl(String);

impl AssetUrl {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        // Whitespace and control characters never survive a round trip through
        // HTTP or a sidecar file intact, so they can't be part of a key.
        if url.is_empty() || url.chars().any(|c| c.is_whitespace() || c.is_control()) {
            exn::bail!(ErrorKind::InvalidKey(url));
        }
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}
impl Display for AssetUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
impl FromStr for AssetUrl {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
impl TryFrom<String> for AssetUrl {
    type Error = Error;
    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}
impl TryFrom<&str> for AssetUrl {
    type Error = Error;
    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}
impl AsRef<str> for AssetUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
// Hash/Eq/Ord all delegate to the inner String, so borrowing as `str` is
// consistent and lets sets of keys be queried with plain string slices.
impl Borrow<str> for AssetUrl {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case("https://media.example.org/audio/GEN_01.mp3")]
    #[case("https://media.example.org/video/Amazing%20Grace.mp4")]
    #[case("https://media.example.org/video/Âme_Sainte.mp4")]
    #[case("manifest:hymns")]
    fn test_valid_keys(#[case] input: &str) {
        assert_eq!(AssetUrl::new(input).unwrap().as_str(), input);
    }

    #[rstest]
    #[case("")]
    #[case(" ")]
    #[case("https://media.example.org/video/Amazing Grace.mp4")]
    #[case("https://media.example.org/\taudio")]
    #[case("nul\0byte")]
    fn test_invalid_keys(#[case] input: &str) {
        let err = AssetUrl::new(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[test]
    fn test_keys_are_not_normalized() {
        let a = AssetUrl::new("https://a.example/b").unwrap();
        let b = AssetUrl::new("https://a.example//b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_borrow_as_str() {
        let set: HashSet<AssetUrl> = [AssetUrl::new("https://a.example/b").unwrap()].into_iter().collect();
        assert!(set.contains("https://a.example/b"));
        assert!(!set.contains("https://a.example/c"));
    }
}
