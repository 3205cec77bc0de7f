//! Offline media-cache synchronization engine.
//!
//! Keeps a persistent local store of audio chapters and video hymns in step
//! with a remote origin, and decides per request whether live resources come
//! from the network, the cache or both. [`Engine`] wires the workspace crates
//! together from a [`Config`]:
//!
//! - [`chorale_catalog`]: the book table, the manifest, desired URL sets
//! - [`chorale_storage`] and [`chorale_cache`]: content cache backends
//! - [`chorale_fetch`]: HTTP and chunked batch downloads
//! - [`chorale_sync`]: manifest fallback and reconciliation passes
//! - [`chorale_router`]: per-origin request strategies

mod engine;
pub mod error;
pub mod logging;

pub use crate::engine::{Backends, Engine};
pub use chorale_config::Config;
pub use chorale_sync::{SyncEvent, SyncReport};
