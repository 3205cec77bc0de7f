use crate::Synchronizer;
use crate::error::{ErrorKind, Result};
use crate::manifest::ManifestSource;
use crate::reconcile::Revalidate;
use async_stream::stream;
use chorale_catalog::DesiredSet;
use chorale_fetch::{BatchEvent, FetchOutcome};
use chorale_storage::AssetUrl;
use chorale_storage::error::ErrorKind as StorageErrorKind;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Progress events emitted by [`Synchronizer::synchronize_stream`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), once.
/// 2. [`ManifestLoaded`](Self::ManifestLoaded), once.
/// 3. [`DesiredComputed`](Self::DesiredComputed), once.
/// 4. [`Fetched`](Self::Fetched), once per URL fetched.
/// 5. Either [`Cancelled`](Self::Cancelled), ending the stream, or the sweep:
///    [`Evicted`](Self::Evicted) and [`EvictionFailed`](Self::EvictionFailed)
///    for each stale key, then [`Complete`](Self::Complete).
///
/// A pass-level error terminates the stream early with an `Err` item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started,
    ManifestLoaded { source: ManifestSource, hymns: usize },
    /// `to_fetch` is smaller than `desired` only when revalidating missing
    /// entries alone.
    DesiredComputed { desired: usize, to_fetch: usize },
    Fetched { url: AssetUrl, outcome: FetchOutcome },
    /// The pass stopped at a chunk boundary; `remaining` URLs were never
    /// fetched and the sweep was skipped.
    Cancelled { remaining: usize },
    Evicted(AssetUrl),
    EvictionFailed { url: AssetUrl, reason: String },
    Complete,
}

impl Synchronizer {
    /// Streams [`SyncEvent`]s for one pass.
    ///
    /// The pass holds this synchronizer's guard from the first poll until the
    /// stream is finished or dropped. A stream created while another pass is
    /// running yields a single [`ErrorKind::AlreadyRunning`] error.
    pub fn synchronize_stream<'a>(
        &'a self,
        audio_base: &'a str,
        video_base: &'a str,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<SyncEvent>> + 'a {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let Ok(_guard) = self.running.try_lock() else {
                tracing::warn!("Synchronization requested while a pass is already running");
                yield Err(exn::Exn::from(ErrorKind::AlreadyRunning));
                return;
            };
            yield Ok(SyncEvent::Started);

            // Phase 1: desired set.
            let read = match self.manifests.read(&self.location.key, &self.location.url).await {
                Ok(read) => read,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            yield Ok(SyncEvent::ManifestLoaded { source: read.source, hymns: read.manifest.len() });
            let desired = match chorale_catalog::build(&self.catalog, &read.manifest, audio_base, video_base)
                .or_raise(|| ErrorKind::InvalidTarget)
            {
                Ok(desired) => desired,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };

            // Phase 2: add/update.
            if let Err(e) = self.cache.ping().await.or_raise(|| ErrorKind::CacheUnavailable) {
                tracing::error!(cache = self.cache.name(), "Cache unavailable; aborting pass");
                yield Err(e);
                return;
            }
            let to_fetch = match self.select(&desired).await {
                Ok(urls) => urls,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            tracing::info!(desired = desired.len(), to_fetch = to_fetch.len(), "Fetching assets");
            yield Ok(SyncEvent::DesiredComputed { desired: desired.len(), to_fetch: to_fetch.len() });

            let mut batch = std::pin::pin!(self.batch.fetch_stream(to_fetch, cancel));
            while let Some(event) = batch.next().await {
                match event {
                    Ok(BatchEvent::Fetched { url, outcome }) => {
                        yield Ok(SyncEvent::Fetched { url, outcome });
                    },
                    Ok(BatchEvent::Cancelled { remaining }) => {
                        tracing::info!(remaining, "Pass cancelled; skipping sweep");
                        yield Ok(SyncEvent::Cancelled { remaining });
                        return;
                    },
                    Ok(BatchEvent::Started { .. } | BatchEvent::ChunkStarted { .. } | BatchEvent::Complete) => {},
                    Err(e) => {
                        yield Err(e).or_raise(|| ErrorKind::CacheUnavailable);
                        return;
                    },
                }
            }

            // Phase 3: sweep.
            let keys = match self.cache.list_keys().await.or_raise(|| ErrorKind::CacheUnavailable) {
                Ok(keys) => keys,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            let stale: Vec<_> = keys.into_iter().filter(|key| !desired.contains(key)).collect();
            tracing::info!(stale = stale.len(), "Sweeping cache");
            for url in stale {
                match self.cache.delete(&url).await {
                    Ok(()) => {
                        tracing::debug!(%url, "Evicted");
                        yield Ok(SyncEvent::Evicted(url));
                    },
                    Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => {
                        tracing::debug!(%url, "Already gone");
                    },
                    Err(e) if e.is_unavailable() => {
                        yield Err(e).or_raise(|| ErrorKind::CacheUnavailable);
                        return;
                    },
                    Err(e) => {
                        tracing::warn!(%url, error = %e, "Failed to evict");
                        yield Ok(SyncEvent::EvictionFailed { url, reason: e.to_string() });
                    },
                }
            }

            yield Ok(SyncEvent::Complete);
        })
    }

    async fn select(&self, desired: &DesiredSet) -> Result<Vec<AssetUrl>> {
        match self.revalidate {
            Revalidate::Always => Ok(desired.to_vec()),
            Revalidate::MissingOnly => {
                let cached: HashSet<AssetUrl> =
                    self.cache.list_keys().await.or_raise(|| ErrorKind::CacheUnavailable)?.into_iter().collect();
                Ok(desired.iter().filter(|url| !cached.contains(*url)).cloned().collect())
            },
        }
    }
}
