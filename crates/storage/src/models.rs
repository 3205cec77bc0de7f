//! Storage models.

use crate::AssetUrl;
use time::UtcDateTime;

/// A cached blob together with the key it was stored under.
///
/// Created on a successful fetch, overwritten on revalidation and deleted on
/// eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: AssetUrl,
    pub blob: Vec<u8>,
    /// When the blob was last written (second precision for persistent
    /// backends).
    pub stored_at: UtcDateTime,
}
impl CacheEntry {
    pub fn new(url: AssetUrl, blob: impl Into<Vec<u8>>, stored_at: UtcDateTime) -> Self {
        Self { url, blob: blob.into(), stored_at }
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            url: self.url.clone(),
            size: self.blob.len() as u64,
            stored_at: self.stored_at,
        }
    }
}

/// Entry metadata returned by listing operations, without the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub url: AssetUrl,
    /// Blob size in bytes
    pub size: u64,
    pub stored_at: UtcDateTime,
}
