//! Getting bytes from the network into the content cache.
//!
//! [`Fetcher`] is the seam between the engine and the transport: production
//! code uses [`HttpFetcher`], tests substitute scripted fakes. [`BatchFetcher`]
//! drives a fetcher over many URLs in fixed-size chunks, writing each
//! successful download straight into a cache backend.

mod batch;
pub mod error;
mod http;

pub use crate::batch::{BatchEvent, BatchFetcher, BatchReport, DEFAULT_CHUNK_SIZE, FailureReason, FetchOutcome};
pub use crate::http::{FetchMode, Fetcher, HttpFetcher};
use std::sync::Arc;

pub type FetcherHandle = Arc<dyn Fetcher + Send + Sync>;
