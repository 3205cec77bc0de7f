//! Cache backend trait and implementations.
//!
//! This module defines the `CacheBackend` trait, a persistent key → blob store
//! keyed by [`AssetUrl`]. The synchronizer, the manifest store and the request
//! router all talk to storage through it, so any of them can be pointed at the
//! filesystem, an SQLite database (see the `chorale-cache` crate) or an
//! in-memory mock.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::{AssetUrl, CacheEntry, EntryInfo};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub type EntryInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<EntryInfo>> + Send + 'a>>;

/// Unified interface for content cache backends.
///
/// Every operation is independently atomic per key: a `put` either replaces
/// the whole entry or leaves the previous one in place, and concurrent writes
/// to *different* keys never interfere. Concurrent writes to the *same* key are
/// last-write-wins.
///
/// # Examples
///
/// ```
/// use chorale_storage::{AssetUrl, backend::CacheBackend, error::Result};
///
/// async fn cached_size(backend: &dyn CacheBackend, url: &AssetUrl) -> Result<u64> {
///     Ok(match backend.get(url).await? {
///         Some(entry) => entry.blob.len() as u64,
///         None => 0,
///     })
/// }
/// ```
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Check that the store is operable at all.
    ///
    /// Returns [`Unavailable`](crate::error::ErrorKind::Unavailable) when the
    /// storage subsystem itself is out of action. Callers use this to tell a
    /// pass-level failure apart from a single entry failing.
    async fn ping(&self) -> Result<()>;

    /// List the keys of every stored entry.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream).
    async fn list_keys(&self) -> Result<Vec<AssetUrl>> {
        self.list_stream().map_ok(|info| info.url).try_collect().await
    }

    /// List metadata for every stored entry.
    async fn list(&self) -> Result<Vec<EntryInfo>> {
        self.list_stream().try_collect().await
    }

    /// Stream metadata for every stored entry, yielding results incrementally.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use chorale_storage::{backend::CacheBackend, error::Result};
    /// # async fn example(backend: &dyn CacheBackend) -> Result<()> {
    /// let mut stream = backend.list_stream();
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.url, info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream(&self) -> EntryInfoStream<'_>;

    /// Check if an entry exists.
    async fn exists(&self, url: &AssetUrl) -> Result<bool>;

    /// Read an entry. Returns `None` when nothing is stored under the key.
    async fn get(&self, url: &AssetUrl) -> Result<Option<CacheEntry>>;

    /// Store a blob, fully replacing any previous entry under the same key.
    async fn put(&self, url: &AssetUrl, blob: &[u8]) -> Result<()>;

    /// Delete an entry.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if there is no
    /// entry under the key.
    async fn delete(&self, url: &AssetUrl) -> Result<()>;

    /// Get entry metadata without reading the blob.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if there is no
    /// entry under the key.
    async fn stat(&self, url: &AssetUrl) -> Result<EntryInfo>;
}
