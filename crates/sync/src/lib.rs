//! Keeping the content cache in step with the remote origin.
//!
//! A pass ([`Synchronizer::synchronize`]) runs three strictly ordered phases:
//!
//! 1. Load the manifest ([`ManifestStore`]) and expand it together with the
//!    catalog into the desired set of asset URLs.
//! 2. Fetch every desired URL into the cache, chunk by chunk.
//! 3. Sweep: delete every cached key that is no longer desired.
//!
//! After an uncancelled pass in which nothing failed, the cache holds exactly
//! the desired set.

pub mod error;
mod manifest;
mod reconcile;
mod stream;
#[cfg(test)]
mod testing;

pub use crate::manifest::{ManifestRead, ManifestSource, ManifestStore};
pub use crate::reconcile::{ManifestLocation, Revalidate, SyncReport, Synchronizer};
pub use crate::stream::SyncEvent;
