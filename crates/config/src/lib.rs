//! Layered configuration: built-in defaults, then an optional file (YAML,
//! TOML or JSON, chosen by extension), then `CHORALE_` environment variables
//! with `__` separating nested keys (`CHORALE_SYNC__CHUNK_SIZE=4`).

pub mod error;
mod load;
mod model;

pub use crate::load::default_data_dir;
pub use crate::model::{
    BookConfig, Config, HttpConfig, RevalidatePolicy, RouterConfig, StorageConfig, StorageKind, SyncConfig,
};
