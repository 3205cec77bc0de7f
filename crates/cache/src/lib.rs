//! SQLite-backed content cache.
//!
//! A single database file holds any number of named buckets. Each
//! [`SqliteBackend`] is scoped to one bucket and implements
//! [`CacheBackend`](chorale_storage::CacheBackend), so the media cache, the
//! manifest store and the runtime cache can share a file without ever seeing
//! each other's keys. Wiping a bucket's keys (eviction) can't touch another
//! bucket.

mod backend;
mod db;
pub mod error;
mod models;

pub use crate::backend::SqliteBackend;
pub use crate::db::Database;
