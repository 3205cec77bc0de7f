use crate::FetcherHandle;
use crate::error::{ErrorKind, Result};
use crate::http::FetchMode;
use async_stream::stream;
use chorale_storage::error::Error as StorageError;
use chorale_storage::{AssetUrl, BackendHandle};
use exn::ResultExt;
use futures::future::join_all;
use futures::{Stream, TryStreamExt};
use std::collections::HashMap;
use std::collections::hash_map::Iter;
use tokio_util::sync::CancellationToken;

/// Requests in flight at once, unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Why a single asset didn't make it into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The network request failed or returned a non-2xx status.
    Fetch(String),
    /// The body arrived but the cache rejected it.
    CacheWrite(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Stored { bytes: usize },
    Failed(FailureReason),
}
impl FetchOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Per-URL results of a batch.
///
/// Every URL handed to the batch appears exactly once, unless the batch was
/// cancelled before reaching it.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    outcomes: HashMap<AssetUrl, FetchOutcome>,
    cancelled: bool,
}
impl BatchReport {
    pub fn get(&self, url: &AssetUrl) -> Option<&FetchOutcome> {
        self.outcomes.get(url)
    }

    pub fn iter(&self) -> Iter<'_, AssetUrl, FetchOutcome> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn stored_count(&self) -> usize {
        self.outcomes.values().filter(|outcome| outcome.is_stored()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.stored_count()
    }

    /// URLs whose download or cache write failed.
    pub fn failed(&self) -> impl Iterator<Item = (&AssetUrl, &FailureReason)> {
        self.outcomes.iter().filter_map(|(url, outcome)| match outcome {
            FetchOutcome::Failed(reason) => Some((url, reason)),
            FetchOutcome::Stored { .. } => None,
        })
    }

    /// `true` if cancellation stopped the batch before every chunk ran.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn into_outcomes(self) -> HashMap<AssetUrl, FetchOutcome> {
        self.outcomes
    }
}

/// Progress events emitted by [`BatchFetcher::fetch_stream`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) exactly once.
/// 2. For each chunk, [`ChunkStarted`](Self::ChunkStarted) followed by one
///    [`Fetched`](Self::Fetched) per URL in the chunk.
/// 3. Either [`Cancelled`](Self::Cancelled) or [`Complete`](Self::Complete),
///    exactly once.
///
/// If the cache becomes unavailable the stream ends with an `Err` after the
/// offending chunk's `Fetched` events, and neither terminal event is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started { total: usize, chunks: usize },
    ChunkStarted { index: usize, size: usize },
    Fetched { url: AssetUrl, outcome: FetchOutcome },
    /// Cancellation was observed at a chunk boundary; `remaining` URLs were
    /// never requested.
    Cancelled { remaining: usize },
    Complete,
}

enum Settled {
    Done(FetchOutcome),
    StoreUnavailable(StorageError),
}

/// Downloads many assets with bounded concurrency and writes each one into the
/// cache as soon as it arrives.
///
/// URLs are processed in consecutive chunks of `chunk_size`. Within a chunk all
/// requests run concurrently; the next chunk starts only once every request of
/// the current one has settled, successfully or not. One URL failing never
/// affects the others.
pub struct BatchFetcher {
    fetcher: FetcherHandle,
    cache: BackendHandle,
    chunk_size: usize,
    mode: FetchMode,
}
impl BatchFetcher {
    pub fn new(fetcher: FetcherHandle, cache: BackendHandle) -> Self {
        Self { fetcher, cache, chunk_size: DEFAULT_CHUNK_SIZE, mode: FetchMode::default() }
    }

    /// Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub async fn fetch_all(&self, urls: Vec<AssetUrl>) -> Result<BatchReport> {
        self.fetch_all_until(urls, &CancellationToken::new()).await
    }

    /// Fetch every URL, stopping early at the next chunk boundary once
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::CacheUnavailable`] if the cache refused writes altogether
    /// (as opposed to rejecting a single entry); the chunk in flight is allowed
    /// to settle but no further chunks are started.
    pub async fn fetch_all_until(&self, urls: Vec<AssetUrl>, cancel: &CancellationToken) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut events = std::pin::pin!(self.fetch_stream(urls, cancel));
        while let Some(event) = events.try_next().await? {
            match event {
                BatchEvent::Fetched { url, outcome } => _ = report.outcomes.insert(url, outcome),
                BatchEvent::Cancelled { .. } => report.cancelled = true,
                BatchEvent::Started { .. } | BatchEvent::ChunkStarted { .. } | BatchEvent::Complete => {},
            }
        }
        Ok(report)
    }

    /// Streams [`BatchEvent`]s while fetching `urls` chunk by chunk.
    pub fn fetch_stream<'a>(
        &'a self,
        urls: Vec<AssetUrl>,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<BatchEvent>> + 'a {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let total = urls.len();
            yield Ok(BatchEvent::Started { total, chunks: total.div_ceil(self.chunk_size) });
            tracing::debug!(total, chunk_size = self.chunk_size, cache = self.cache.name(), "Starting batch fetch");

            for (index, chunk) in urls.chunks(self.chunk_size).enumerate() {
                if cancel.is_cancelled() {
                    let remaining = total - index * self.chunk_size;
                    tracing::info!(remaining, "Batch fetch cancelled");
                    yield Ok(BatchEvent::Cancelled { remaining });
                    return;
                }
                yield Ok(BatchEvent::ChunkStarted { index, size: chunk.len() });

                let settled = join_all(chunk.iter().map(|url| self.settle(url))).await;
                let mut unavailable = None;
                for (url, settled) in chunk.iter().zip(settled) {
                    let outcome = match settled {
                        Settled::Done(outcome) => outcome,
                        Settled::StoreUnavailable(e) => {
                            let outcome = FetchOutcome::Failed(FailureReason::CacheWrite(e.to_string()));
                            unavailable.get_or_insert(e);
                            outcome
                        },
                    };
                    yield Ok(BatchEvent::Fetched { url: url.clone(), outcome });
                }
                if let Some(e) = unavailable {
                    tracing::error!(cache = self.cache.name(), chunk = index, "Cache unavailable; abandoning batch");
                    yield Err(e).or_raise(|| ErrorKind::CacheUnavailable);
                    return;
                }
            }

            yield Ok(BatchEvent::Complete);
        })
    }

    async fn settle(&self, url: &AssetUrl) -> Settled {
        let body = match self.fetcher.fetch(url, self.mode).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(%url, error = %e, "Failed to fetch asset");
                return Settled::Done(FetchOutcome::Failed(FailureReason::Fetch(e.to_string())));
            },
        };
        match self.cache.put(url, &body).await {
            Ok(()) => Settled::Done(FetchOutcome::Stored { bytes: body.len() }),
            Err(e) if e.is_unavailable() => Settled::StoreUnavailable(e),
            Err(e) => {
                tracing::warn!(%url, error = %e, "Failed to write asset to cache");
                Settled::Done(FetchOutcome::Failed(FailureReason::CacheWrite(e.to_string())))
            },
        }
    }
}
