pub mod backend;
pub mod error;
mod key;
mod models;

pub use crate::backend::CacheBackend;
pub use crate::key::AssetUrl;
pub use crate::models::{CacheEntry, EntryInfo};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn CacheBackend + Send + Sync>;
