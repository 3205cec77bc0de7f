use crate::error::{ErrorKind, Result};
use crate::manifest::{ManifestSource, ManifestStore};
use crate::stream::SyncEvent;
use chorale_catalog::Catalog;
use chorale_fetch::{BatchFetcher, FailureReason, FetchOutcome, FetcherHandle};
use chorale_storage::{AssetUrl, BackendHandle};
use exn::OptionExt;
use futures::TryStreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Which desired URLs a pass downloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Revalidate {
    /// Re-download every desired URL, overwriting cached copies.
    #[default]
    Always,
    /// Only download URLs the cache doesn't hold yet.
    MissingOnly,
}

/// Where the manifest is fetched from and the key its last good copy is kept
/// under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocation {
    pub url: AssetUrl,
    pub key: AssetUrl,
}
impl ManifestLocation {
    /// Keep the last good copy under the manifest's own URL.
    pub fn new(url: AssetUrl) -> Self {
        Self { key: url.clone(), url }
    }

    pub fn with_key(mut self, key: AssetUrl) -> Self {
        self.key = key;
        self
    }
}

/// What a synchronization pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub manifest_source: ManifestSource,
    /// Size of the desired set.
    pub desired: usize,
    /// Desired URLs not downloaded because they were already cached.
    pub skipped: usize,
    pub stored: usize,
    pub failed: Vec<(AssetUrl, FailureReason)>,
    pub evicted: usize,
    pub eviction_failures: usize,
    /// The pass was cancelled before the sweep.
    pub cancelled: bool,
}
impl SyncReport {
    fn new(manifest_source: ManifestSource) -> Self {
        Self {
            manifest_source,
            desired: 0,
            skipped: 0,
            stored: 0,
            failed: Vec::new(),
            evicted: 0,
            eviction_failures: 0,
            cancelled: false,
        }
    }

    /// `true` if the cache now holds exactly the desired set.
    pub fn is_converged(&self) -> bool {
        !self.cancelled && self.failed.is_empty() && self.eviction_failures == 0
    }
}

/// Reconciles the content cache against the catalog and the manifest.
///
/// A synchronizer runs at most one pass at a time; see
/// [`synchronize`](Self::synchronize).
pub struct Synchronizer {
    pub(crate) catalog: Catalog,
    pub(crate) manifests: ManifestStore,
    pub(crate) location: ManifestLocation,
    pub(crate) cache: BackendHandle,
    pub(crate) batch: BatchFetcher,
    pub(crate) revalidate: Revalidate,
    pub(crate) running: Mutex<()>,
}

impl Synchronizer {
    /// `manifests` must not be backed by `cache`: the sweep deletes anything
    /// in `cache` outside the desired set.
    pub fn new(
        catalog: Catalog,
        manifests: ManifestStore,
        location: ManifestLocation,
        cache: BackendHandle,
        fetcher: FetcherHandle,
    ) -> Self {
        Self {
            catalog,
            manifests,
            location,
            batch: BatchFetcher::new(fetcher, cache.clone()),
            cache,
            revalidate: Revalidate::default(),
            running: Mutex::new(()),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.batch = self.batch.with_chunk_size(chunk_size);
        self
    }

    pub fn with_revalidate(mut self, revalidate: Revalidate) -> Self {
        self.revalidate = revalidate;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn synchronize(&self, audio_base: &str, video_base: &str) -> Result<SyncReport> {
        self.synchronize_until(audio_base, video_base, &CancellationToken::new()).await
    }

    /// Run one pass, checking `cancel` between fetch chunks.
    ///
    /// A cancelled pass stops before its next chunk, skips the sweep and
    /// reports [`SyncReport::cancelled`]; whatever was already fetched stays
    /// cached. Individual asset failures are only recorded in the report.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::AlreadyRunning`] if another pass is in progress.
    /// - [`ErrorKind::ManifestUnavailable`] if no manifest could be loaded;
    ///   the cache is left untouched.
    /// - [`ErrorKind::InvalidTarget`] if the base URLs are unusable.
    /// - [`ErrorKind::CacheUnavailable`] if the cache stops accepting writes
    ///   or can't be listed.
    #[instrument(skip(self, cancel))]
    pub async fn synchronize_until(
        &self,
        audio_base: &str,
        video_base: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let mut report = None;
        let mut events = std::pin::pin!(self.synchronize_stream(audio_base, video_base, cancel));
        while let Some(event) = events.try_next().await? {
            match event {
                SyncEvent::Started | SyncEvent::Complete => {},
                SyncEvent::ManifestLoaded { source, .. } => report = Some(SyncReport::new(source)),
                SyncEvent::DesiredComputed { desired, to_fetch } => {
                    if let Some(report) = report.as_mut() {
                        report.desired = desired;
                        report.skipped = desired - to_fetch;
                    }
                },
                SyncEvent::Fetched { url, outcome } => {
                    if let Some(report) = report.as_mut() {
                        match outcome {
                            FetchOutcome::Stored { .. } => report.stored += 1,
                            FetchOutcome::Failed(reason) => report.failed.push((url, reason)),
                        }
                    }
                },
                SyncEvent::Cancelled { .. } => {
                    if let Some(report) = report.as_mut() {
                        report.cancelled = true;
                    }
                },
                SyncEvent::Evicted(_) => {
                    if let Some(report) = report.as_mut() {
                        report.evicted += 1;
                    }
                },
                SyncEvent::EvictionFailed { .. } => {
                    if let Some(report) = report.as_mut() {
                        report.eviction_failures += 1;
                    }
                },
            }
        }
        // The stream always announces the manifest before finishing cleanly.
        let report = report.ok_or_raise(|| ErrorKind::ManifestUnavailable)?;
        tracing::info!(
            desired = report.desired,
            stored = report.stored,
            failed = report.failed.len(),
            evicted = report.evicted,
            cancelled = report.cancelled,
            "Synchronization pass finished"
        );
        Ok(report)
    }
}
