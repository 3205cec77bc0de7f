use crate::error::{ErrorKind, Result};
use crate::{Request, RoutingTable, Strategy};
use chorale_fetch::{FetchMode, FetcherHandle};
use chorale_storage::{AssetUrl, BackendHandle};
use derive_more::Display;
use exn::ResultExt;
use tokio::task::JoinHandle;

/// Served for failed navigations when no offline document has been cached.
pub const OFFLINE_DOCUMENT: &str = "<!doctype html>
<html lang=\"en\">
<head><meta charset=\"utf-8\"><title>Offline</title></head>
<body><h1>You're offline</h1><p>This page isn't available without a connection. Cached hymns and chapters can still be played.</p></body>
</html>
";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    #[display("network")]
    Network,
    #[display("cache")]
    Cache,
    /// The offline fallback document.
    #[display("fallback")]
    Fallback,
}

/// A response body and where it came from.
#[derive(Debug)]
pub struct Served {
    pub body: Vec<u8>,
    pub source: ServedFrom,
    /// Background refresh started by stale-while-revalidate, if any. Dropping
    /// the handle doesn't cancel the refresh.
    pub revalidation: Option<JoinHandle<()>>,
}
impl Served {
    fn new(body: Vec<u8>, source: ServedFrom) -> Self {
        Self { body, source, revalidation: None }
    }
}

/// Executes routing strategies against the network and the runtime cache.
pub struct Router {
    table: RoutingTable,
    fetcher: FetcherHandle,
    cache: BackendHandle,
    offline_document: Option<AssetUrl>,
}

impl Router {
    /// `cache` is the runtime cache; it must not be the media cache, which the
    /// synchronizer sweeps.
    pub fn new(table: RoutingTable, fetcher: FetcherHandle, cache: BackendHandle) -> Self {
        Self { table, fetcher, cache, offline_document: None }
    }

    /// Serve the document cached under `url` for failed navigations, instead
    /// of the built-in [`OFFLINE_DOCUMENT`].
    pub fn with_offline_document(mut self, url: AssetUrl) -> Self {
        self.offline_document = Some(url);
        self
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Fetch the offline document into the runtime cache so it's there once
    /// the connection drops. Does nothing without a configured document.
    pub async fn prime(&self) -> Result<()> {
        let Some(url) = &self.offline_document else {
            return Ok(());
        };
        let body = self.fetcher.fetch(url, FetchMode::Reload).await.or_raise(|| ErrorKind::Unavailable(url.to_string()))?;
        self.cache.put(url, &body).await.or_raise(|| ErrorKind::Unavailable(url.to_string()))?;
        tracing::info!(%url, "Offline document cached");
        Ok(())
    }

    /// Answer `request` according to the first matching rule.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Unavailable`] when the strategy can't produce a body.
    /// Navigations never fail this way; they get the offline document instead.
    pub async fn handle(&self, request: &Request) -> Result<Served> {
        let strategy = self.table.resolve(request);
        tracing::debug!(url = %request.url(), %strategy, "Routing request");
        let result = match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::NetworkOnly | Strategy::Passthrough => self.network_only(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        };
        match result {
            Ok(served) => Ok(served),
            Err(e) if request.is_navigation() => {
                tracing::warn!(url = %request.url(), error = %e, "Navigation failed; serving offline document");
                Ok(self.offline_fallback().await)
            },
            Err(e) => Err(e),
        }
    }

    async fn network_first(&self, request: &Request) -> Result<Served> {
        let key = request.cache_key()?;
        let err = match self.fetcher.fetch(&key, FetchMode::Reload).await {
            Ok(body) => {
                if let Err(e) = self.cache.put(&key, &body).await {
                    tracing::warn!(%key, error = %e, "Couldn't cache response");
                }
                return Ok(Served::new(body, ServedFrom::Network));
            },
            Err(e) => e,
        };
        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                tracing::debug!(%key, error = %err, "Network failed; serving cached copy");
                Ok(Served::new(entry.blob, ServedFrom::Cache))
            },
            Ok(None) => Err(err).or_raise(|| ErrorKind::Unavailable(key.to_string())),
            Err(cache_err) => {
                tracing::warn!(%key, error = %cache_err, "Couldn't read runtime cache");
                Err(err).or_raise(|| ErrorKind::Unavailable(key.to_string()))
            },
        }
    }

    async fn network_only(&self, request: &Request) -> Result<Served> {
        let key = request.cache_key()?;
        let body = self.fetcher.fetch(&key, FetchMode::Normal).await.or_raise(|| ErrorKind::Unavailable(key.to_string()))?;
        Ok(Served::new(body, ServedFrom::Network))
    }

    async fn stale_while_revalidate(&self, request: &Request) -> Result<Served> {
        let key = request.cache_key()?;
        let cached = match self.cache.get(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Couldn't read runtime cache");
                None
            },
        };
        if let Some(entry) = cached {
            let revalidation = self.spawn_revalidation(key);
            return Ok(Served { body: entry.blob, source: ServedFrom::Cache, revalidation: Some(revalidation) });
        }
        let body = self.fetcher.fetch(&key, FetchMode::Normal).await.or_raise(|| ErrorKind::Unavailable(key.to_string()))?;
        if let Err(e) = self.cache.put(&key, &body).await {
            tracing::warn!(%key, error = %e, "Couldn't cache response");
        }
        Ok(Served::new(body, ServedFrom::Network))
    }

    fn spawn_revalidation(&self, key: AssetUrl) -> JoinHandle<()> {
        let fetcher = self.fetcher.clone();
        let cache = self.cache.clone();
        tokio::spawn(async move {
            match fetcher.fetch(&key, FetchMode::Normal).await {
                Ok(body) => match cache.put(&key, &body).await {
                    Ok(()) => tracing::trace!(%key, "Revalidated"),
                    Err(e) => tracing::warn!(%key, error = %e, "Couldn't store revalidated response"),
                },
                Err(e) => tracing::debug!(%key, error = %e, "Background revalidation failed"),
            }
        })
    }

    async fn offline_fallback(&self) -> Served {
        if let Some(url) = &self.offline_document {
            match self.cache.get(url).await {
                Ok(Some(entry)) => return Served::new(entry.blob, ServedFrom::Fallback),
                Ok(None) => tracing::debug!(%url, "Offline document not cached; using built-in"),
                Err(e) => tracing::warn!(%url, error = %e, "Couldn't read offline document"),
            }
        }
        Served::new(OFFLINE_DOCUMENT.as_bytes().to_vec(), ServedFrom::Fallback)
    }
}
