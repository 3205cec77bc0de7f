//! In-memory cache backend for testing.

use super::EntryInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{AssetUrl, CacheBackend, CacheEntry, EntryInfo};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory cache backend for testing.
///
/// Entries are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Failures can be
/// injected per key ([`fail_writes_for`](Self::fail_writes_for),
/// [`fail_deletes_for`](Self::fail_deletes_for),
/// [`deleted_elsewhere`](Self::deleted_elsewhere)) or for the whole store ([`set_unavailable`](Self::set_unavailable)).
///
/// # Examples
///
/// ```
/// use chorale_storage::{AssetUrl, backend::{CacheBackend, MockBackend}};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_entries([
///     ("https://media.example.org/audio/GEN_01.mp3", b"ID3"),
/// ]);
/// let url = AssetUrl::new("https://media.example.org/audio/GEN_01.mp3")?;
/// assert!(backend.exists(&url).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<AssetUrl, (UtcDateTime, Vec<u8>)>>,
    failing_writes: HashSet<AssetUrl>,
    failing_deletes: HashSet<AssetUrl>,
    vanishing: HashSet<AssetUrl>,
    unavailable: AtomicBool,
    puts: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with entries.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then test
    /// should not pass.
    pub fn with_entries(entries: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let mut map = HashMap::new();
        for (url, data) in entries {
            let Ok(url) = AssetUrl::new(url.as_ref()) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_entries: invalid key {:?}", url.as_ref());
            };
            map.insert(url, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            failing_writes: HashSet::new(),
            failing_deletes: HashSet::new(),
            vanishing: HashSet::new(),
            unavailable: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every `put` for the given key fail with a backend error.
    pub fn fail_writes_for(mut self, url: impl AsRef<str>) -> Self {
        let Ok(url) = AssetUrl::new(url.as_ref()) else {
            panic!("MockBackend::fail_writes_for: invalid key {:?}", url.as_ref());
        };
        self.failing_writes.insert(url);
        self
    }

    /// Make every `delete` for the given key fail with a backend error,
    /// leaving the entry in place.
    pub fn fail_deletes_for(mut self, url: impl AsRef<str>) -> Self {
        let Ok(url) = AssetUrl::new(url.as_ref()) else {
            panic!("MockBackend::fail_deletes_for: invalid key {:?}", url.as_ref());
        };
        self.failing_deletes.insert(url);
        self
    }

    /// Make `delete` for the given key remove the entry but report
    /// `NotFound`, as if someone else deleted it first.
    pub fn deleted_elsewhere(mut self, url: impl AsRef<str>) -> Self {
        let Ok(url) = AssetUrl::new(url.as_ref()) else {
            panic!("MockBackend::deleted_elsewhere: invalid key {:?}", url.as_ref());
        };
        self.vanishing.insert(url);
        self
    }

    /// Toggle whole-store unavailability; every operation fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `put` calls that reached the store (successful or not).
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable(format!("{} is switched off", self.name)));
        }
        Ok(())
    }

    fn info(url: &AssetUrl, stored_at: UtcDateTime, size: usize) -> EntryInfo {
        EntryInfo {
            url: url.clone(),
            size: size as u64,
            stored_at,
        }
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let entries: [(&str, &[u8]); 0] = [];
        Self::with_entries(entries)
    }
}

#[async_trait]
impl CacheBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    fn list_stream(&self) -> EntryInfoStream<'_> {
        Box::pin(stream! {
            if let Err(e) = self.check_available() {
                yield Err(e);
                return;
            }
            // Snapshot under the read lock, then drop it before yielding to
            // avoid holding the lock across yield points.
            let entries: Vec<EntryInfo> = {
                let guard = self.storage.read().await;
                guard.iter().map(|(url, (stored_at, data))| Self::info(url, *stored_at, data.len())).collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, url: &AssetUrl) -> Result<bool> {
        self.check_available()?;
        Ok(self.storage.read().await.contains_key(url))
    }

    async fn get(&self, url: &AssetUrl) -> Result<Option<CacheEntry>> {
        self.check_available()?;
        let guard = self.storage.read().await;
        Ok(guard.get(url).map(|(stored_at, data)| CacheEntry::new(url.clone(), data.clone(), *stored_at)))
    }

    async fn put(&self, url: &AssetUrl, blob: &[u8]) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.failing_writes.contains(url) {
            exn::bail!(ErrorKind::BackendError(format!("injected write failure for {url}")));
        }
        self.storage.write().await.insert(url.clone(), (UtcDateTime::now(), blob.to_vec()));
        Ok(())
    }

    async fn delete(&self, url: &AssetUrl) -> Result<()> {
        self.check_available()?;
        if self.failing_deletes.contains(url) {
            exn::bail!(ErrorKind::BackendError(format!("injected delete failure for {url}")));
        }
        if self.vanishing.contains(url) {
            self.storage.write().await.remove(url);
            exn::bail!(ErrorKind::NotFound(url.clone()));
        }
        self.storage
            .write()
            .await
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(url.clone())))
    }

    async fn stat(&self, url: &AssetUrl) -> Result<EntryInfo> {
        self.check_available()?;
        let guard = self.storage.read().await;
        let (stored_at, data) = guard.get(url).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(url.clone())))?;
        Ok(Self::info(url, *stored_at, data.len()))
    }
}
