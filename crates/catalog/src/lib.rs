//! What the offline cache is *supposed* to contain.
//!
//! A [`Catalog`] of books (each expanding to one audio file per chapter) and a
//! [`Manifest`] of video hymn filenames are combined by [`build`] into the
//! [`DesiredSet`] of asset URLs for a synchronization pass. Everything in this
//! crate is pure; fetching the manifest and touching the cache happen
//! elsewhere.

mod book;
mod catalog;
pub mod error;
mod manifest;
mod urls;

pub use crate::book::{BookEntry, pad_chapter};
pub use crate::catalog::Catalog;
pub use crate::manifest::Manifest;
pub use crate::urls::{DesiredSet, build};
