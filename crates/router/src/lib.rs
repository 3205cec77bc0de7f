//! Deciding, per request, whether to answer from the network, the cache or
//! both.
//!
//! A [`RoutingTable`] is an ordered list of rules evaluated per request; the
//! first match picks the [`Strategy`]. A [`Router`] executes that strategy
//! against a fetcher and a runtime cache backend, which must be separate from
//! the media cache the synchronizer sweeps.

pub mod error;
mod request;
mod router;
mod rules;

pub use crate::request::{Request, RequestKind};
pub use crate::router::{OFFLINE_DOCUMENT, Router, Served, ServedFrom};
pub use crate::rules::{Matcher, Rule, RoutingTable, Strategy};
