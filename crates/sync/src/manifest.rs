use crate::error::{ErrorKind, Result};
use chorale_catalog::Manifest;
use chorale_fetch::{FetchMode, FetcherHandle};
use chorale_storage::{AssetUrl, BackendHandle};
use derive_more::Display;
use exn::ResultExt;

/// Where the manifest handed out by [`ManifestStore::read`] came from.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    /// Fetched from the origin during this lookup.
    #[display("fresh")]
    Fresh,
    /// The origin couldn't be reached; this is the last good copy.
    #[display("cached")]
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRead {
    pub manifest: Manifest,
    pub source: ManifestSource,
}

/// Network-first access to the manifest, with the last good copy as fallback.
///
/// The last good copy lives in its own backend. Sharing the media cache would
/// let the sweep evict it, since a manifest is never part of the desired set.
pub struct ManifestStore {
    fetcher: FetcherHandle,
    store: BackendHandle,
}

impl ManifestStore {
    pub fn new(fetcher: FetcherHandle, store: BackendHandle) -> Self {
        Self { fetcher, store }
    }

    /// Shorthand for [`read`](Self::read) when the source doesn't matter.
    pub async fn get(&self, key: &AssetUrl, remote: &AssetUrl) -> Result<Manifest> {
        Ok(self.read(key, remote).await?.manifest)
    }

    /// Fetch the manifest from `remote`, falling back to the copy stored under
    /// `key`.
    ///
    /// With a usable cached copy the request bypasses intermediate HTTP
    /// caches, since a stale answer from them would defeat the point of
    /// asking. A response only counts if it's a 2xx with a valid manifest
    /// body; it then replaces the cached copy. A cached copy that can't be
    /// parsed is treated as missing.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::ManifestUnavailable`] if the fetch fails and there is no
    /// usable cached copy.
    pub async fn read(&self, key: &AssetUrl, remote: &AssetUrl) -> Result<ManifestRead> {
        let cached = self.load_cached(key).await;
        let mode = if cached.is_some() { FetchMode::Reload } else { FetchMode::Normal };

        let err = match self.fetch_fresh(remote, mode).await {
            Ok((manifest, raw)) => {
                if let Err(e) = self.store.put(key, &raw).await {
                    tracing::warn!(%key, error = %e, "Couldn't persist fresh manifest");
                }
                tracing::debug!(%remote, hymns = manifest.len(), "Loaded fresh manifest");
                return Ok(ManifestRead { manifest, source: ManifestSource::Fresh });
            },
            Err(e) => e,
        };
        match cached {
            Some(manifest) => {
                tracing::warn!(%remote, error = %err, hymns = manifest.len(), "Manifest fetch failed; using cached copy");
                Ok(ManifestRead { manifest, source: ManifestSource::Cached })
            },
            None => {
                tracing::error!(%remote, error = %err, "Manifest fetch failed and nothing is cached");
                Err(err)
            },
        }
    }

    async fn load_cached(&self, key: &AssetUrl) -> Option<Manifest> {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Couldn't read cached manifest");
                return None;
            },
        };
        match Manifest::from_slice(&entry.blob) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(%key, error = %e, "Ignoring unparseable cached manifest");
                None
            },
        }
    }

    async fn fetch_fresh(&self, remote: &AssetUrl, mode: FetchMode) -> Result<(Manifest, Vec<u8>)> {
        let raw = self.fetcher.fetch(remote, mode).await.or_raise(|| ErrorKind::ManifestUnavailable)?;
        let manifest = Manifest::from_slice(&raw).or_raise(|| ErrorKind::ManifestUnavailable)?;
        Ok((manifest, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeOrigin;
    use chorale_storage::CacheBackend;
    use chorale_storage::backend::MockBackend;
    use std::sync::Arc;

    const REMOTE: &str = "https://api.example.org/hymns.json";
    const KEY: &str = "chorale:manifest";

    fn url(s: &str) -> AssetUrl {
        AssetUrl::new(s).unwrap()
    }

    fn setup(cached: Option<&[u8]>) -> (Arc<FakeOrigin>, Arc<MockBackend>, ManifestStore) {
        let origin = Arc::new(FakeOrigin::default());
        let store = Arc::new(match cached {
            Some(raw) => MockBackend::with_entries([(KEY, raw.to_vec())]),
            None => MockBackend::default(),
        });
        let manifests = ManifestStore::new(origin.clone(), store.clone());
        (origin, store, manifests)
    }

    #[tokio::test]
    async fn test_fresh_without_cache_is_stored() {
        let (origin, store, manifests) = setup(None);
        origin.serve(REMOTE, r#"{"hymns":["a.mp4","b.mp4"]}"#);

        let read = manifests.read(&url(KEY), &url(REMOTE)).await.unwrap();

        assert_eq!(read.source, ManifestSource::Fresh);
        assert_eq!(read.manifest, Manifest::new(["a.mp4", "b.mp4"]));
        assert!(store.exists(&url(KEY)).await.unwrap());
        assert_eq!(origin.calls(), vec![(REMOTE.to_string(), FetchMode::Normal)]);
    }

    #[tokio::test]
    async fn test_fresh_replaces_cached_copy_and_bypasses_http_caches() {
        let (origin, store, manifests) = setup(Some(br#"{"hymns":["old.mp4"]}"#));
        origin.serve(REMOTE, r#"{"hymns":["new.mp4"]}"#);

        let manifest = manifests.get(&url(KEY), &url(REMOTE)).await.unwrap();

        assert_eq!(manifest, Manifest::new(["new.mp4"]));
        let stored = store.get(&url(KEY)).await.unwrap().unwrap();
        assert_eq!(Manifest::from_slice(&stored.blob).unwrap(), manifest);
        assert_eq!(origin.calls(), vec![(REMOTE.to_string(), FetchMode::Reload)]);
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_cached_copy() {
        let (origin, _store, manifests) = setup(Some(br#"{"hymns":["old.mp4"]}"#));
        origin.set_offline(true);

        let read = manifests.read(&url(KEY), &url(REMOTE)).await.unwrap();

        assert_eq!(read.source, ManifestSource::Cached);
        assert_eq!(read.manifest, Manifest::new(["old.mp4"]));
    }

    #[tokio::test]
    async fn test_error_status_falls_back_to_cached_copy() {
        let (origin, _store, manifests) = setup(Some(br#"{"hymns":["old.mp4"]}"#));
        origin.fail(REMOTE);

        let read = manifests.read(&url(KEY), &url(REMOTE)).await.unwrap();
        assert_eq!(read.source, ManifestSource::Cached);
    }

    #[tokio::test]
    async fn test_malformed_response_never_overwrites_cached_copy() {
        let (origin, store, manifests) = setup(Some(br#"{"hymns":["old.mp4"]}"#));
        origin.serve(REMOTE, "<html>captive portal</html>");

        let read = manifests.read(&url(KEY), &url(REMOTE)).await.unwrap();

        assert_eq!(read.source, ManifestSource::Cached);
        let stored = store.get(&url(KEY)).await.unwrap().unwrap();
        assert_eq!(stored.blob, br#"{"hymns":["old.mp4"]}"#);
    }

    #[tokio::test]
    async fn test_unavailable_without_cache() {
        let (origin, _store, manifests) = setup(None);
        origin.set_offline(true);

        let err = manifests.read(&url(KEY), &url(REMOTE)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ManifestUnavailable);
    }

    #[tokio::test]
    async fn test_unparseable_cache_counts_as_missing() {
        let (origin, _store, manifests) = setup(Some(b"garbage"));
        origin.set_offline(true);

        let err = manifests.read(&url(KEY), &url(REMOTE)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ManifestUnavailable);
        // Nothing usable was cached, so the request didn't need to bypass caches.
        assert_eq!(origin.calls()[0].1, FetchMode::Normal);
    }

    #[tokio::test]
    async fn test_persist_failure_still_returns_fresh() {
        let origin = Arc::new(FakeOrigin::default());
        origin.serve(REMOTE, r#"{"hymns":["a.mp4"]}"#);
        let store = Arc::new(MockBackend::default().fail_writes_for(KEY));
        let manifests = ManifestStore::new(origin, store.clone());

        let read = manifests.read(&url(KEY), &url(REMOTE)).await.unwrap();

        assert_eq!(read.source, ManifestSource::Fresh);
        assert!(!store.exists(&url(KEY)).await.unwrap());
    }
}
