use crate::error::{ErrorKind, Result};
use chorale_cache::{Database, SqliteBackend};
use chorale_catalog::{BookEntry, Catalog};
use chorale_config::{BookConfig, Config, RevalidatePolicy, StorageKind};
use chorale_fetch::{FetcherHandle, HttpFetcher};
use chorale_router::{Router, RoutingTable};
use chorale_storage::backend::LocalBackend;
use chorale_storage::{AssetUrl, BackendHandle};
use chorale_sync::{ManifestLocation, ManifestStore, Revalidate, SyncReport, Synchronizer};
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const MEDIA_BUCKET: &str = "media";
const MANIFEST_BUCKET: &str = "manifests";
const RUNTIME_BUCKET: &str = "runtime";

/// The three stores an engine keeps apart: the swept media cache, the last
/// good manifests, and the router's runtime cache.
#[derive(Clone)]
pub struct Backends {
    pub media: BackendHandle,
    pub manifests: BackendHandle,
    pub runtime: BackendHandle,
}

impl Backends {
    /// Open the configured storage kind, creating it if needed.
    ///
    /// Returns the database handle for the SQLite kind so it can be closed
    /// cleanly.
    pub async fn open(config: &Config) -> Result<(Self, Option<Database>)> {
        let path = config.storage_path().or_raise(|| ErrorKind::Config)?;
        match config.storage.kind {
            StorageKind::Sqlite => {
                let database = Database::connect(&path).await.or_raise(|| ErrorKind::Storage)?;
                let bucket = |name: &str| -> Result<BackendHandle> {
                    let backend = SqliteBackend::new(&database, name).or_raise(|| ErrorKind::Storage)?;
                    Ok(Arc::new(backend))
                };
                let backends = Self {
                    media: bucket(MEDIA_BUCKET)?,
                    manifests: bucket(MANIFEST_BUCKET)?,
                    runtime: bucket(RUNTIME_BUCKET)?,
                };
                tracing::info!(path = %path.display(), "Opened SQLite cache");
                Ok((backends, Some(database)))
            },
            StorageKind::Local => {
                let root = std::path::absolute(&path).or_raise(|| ErrorKind::Storage)?;
                let bucket = |name: &str| -> Result<BackendHandle> {
                    let backend = LocalBackend::new(format!("local:{name}"), root.join(name))
                        .or_raise(|| ErrorKind::Storage)?;
                    Ok(Arc::new(backend))
                };
                let backends = Self {
                    media: bucket(MEDIA_BUCKET)?,
                    manifests: bucket(MANIFEST_BUCKET)?,
                    runtime: bucket(RUNTIME_BUCKET)?,
                };
                tracing::info!(root = %root.display(), "Opened local cache");
                Ok((backends, None))
            },
        }
    }
}

/// A synchronizer and a router sharing one configuration and one transport.
pub struct Engine {
    config: Config,
    backends: Backends,
    synchronizer: Synchronizer,
    router: Router,
    database: Option<Database>,
}

impl Engine {
    /// Validate `config`, open its storage and build an HTTP client.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let fetcher: FetcherHandle = Arc::new(
            HttpFetcher::new(Duration::from_secs(config.http.timeout_secs), &config.http.user_agent)
                .or_raise(|| ErrorKind::Http)?,
        );
        let (backends, database) = Backends::open(&config).await?;
        let mut engine = Self::with_parts(config, fetcher, backends)?;
        engine.database = database;
        Ok(engine)
    }

    /// Assemble an engine around an existing transport and stores.
    pub fn with_parts(config: Config, fetcher: FetcherHandle, backends: Backends) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let mut location = ManifestLocation::new(asset_url(&config.sync.manifest_url)?);
        if let Some(key) = &config.sync.manifest_key {
            location = location.with_key(asset_url(key)?);
        }
        let revalidate = match config.sync.revalidate {
            RevalidatePolicy::Always => Revalidate::Always,
            RevalidatePolicy::MissingOnly => Revalidate::MissingOnly,
        };
        let synchronizer = Synchronizer::new(
            catalog(&config)?,
            ManifestStore::new(fetcher.clone(), backends.manifests.clone()),
            location,
            backends.media.clone(),
            fetcher.clone(),
        )
        .with_chunk_size(config.sync.chunk_size)
        .with_revalidate(revalidate);
        let router = router(&config, fetcher, backends.runtime.clone())?;
        Ok(Self { config, backends, synchronizer, router, database: None })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run one pass against explicit base URLs.
    pub async fn synchronize(&self, audio_base: &str, video_base: &str) -> chorale_sync::error::Result<SyncReport> {
        self.synchronizer.synchronize(audio_base, video_base).await
    }

    pub async fn synchronize_until(
        &self,
        audio_base: &str,
        video_base: &str,
        cancel: &CancellationToken,
    ) -> chorale_sync::error::Result<SyncReport> {
        self.synchronizer.synchronize_until(audio_base, video_base, cancel).await
    }

    /// Run one pass against the configured base URLs.
    pub async fn synchronize_configured(&self) -> chorale_sync::error::Result<SyncReport> {
        self.synchronize(&self.config.sync.audio_base, &self.config.sync.video_base).await
    }

    /// Release free pages and close the database, if there is one.
    pub async fn close(self) {
        if let Some(database) = self.database {
            database.reclaim().await;
            database.close().await;
        }
    }
}

fn asset_url(value: &str) -> Result<AssetUrl> {
    AssetUrl::new(value).or_raise(|| ErrorKind::InvalidUrl(value.to_string()))
}

fn catalog(config: &Config) -> Result<Catalog> {
    let Some(books) = &config.catalog else {
        return Ok(Catalog::bible());
    };
    let entries = books.iter().map(book_entry).collect::<Result<Vec<_>>>()?;
    Catalog::new(entries).or_raise(|| ErrorKind::Catalog)
}

fn book_entry(book: &BookConfig) -> Result<BookEntry> {
    let entry = BookEntry::new(&book.name, book.chapters, &book.audio_prefix);
    match book.width {
        Some(width) => entry.with_width(width).or_raise(|| ErrorKind::Catalog),
        None => Ok(entry),
    }
}

fn router(config: &Config, fetcher: FetcherHandle, runtime: BackendHandle) -> Result<Router> {
    let app_origin = match &config.router.app_origin {
        Some(origin) => Some(Url::parse(origin).or_raise(|| ErrorKind::InvalidUrl(origin.clone()))?),
        None => None,
    };
    let table = RoutingTable::standard(
        app_origin.as_ref(),
        &config.manifest_hosts(),
        &config.media_hosts(),
        &config.router.live_paths,
    );
    let mut router = Router::new(table, fetcher, runtime);
    if let Some(document) = &config.router.offline_document {
        router = router.with_offline_document(asset_url(document)?);
    }
    Ok(router)
}
