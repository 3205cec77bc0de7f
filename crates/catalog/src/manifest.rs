use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// The remote list of available video hymns.
///
/// Wire format is `{ "hymns": ["<filename>", ...] }`. Filenames are opaque;
/// they're appended to the configured video base URL with only whitespace and
/// control characters percent-encoded (see [`build`](crate::build)). Unknown fields are
/// ignored so the origin can grow the document without breaking old clients,
/// but a document without `hymns` is rejected (an HTML error page or an
/// unrelated JSON body must never be mistaken for an empty manifest).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub hymns: Vec<String>,
}
impl Manifest {
    pub fn new(hymns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { hymns: hymns.into_iter().map(Into::into).collect() }
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).or_raise(|| ErrorKind::InvalidManifest)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).or_raise(|| ErrorKind::InvalidManifest)
    }

    pub fn len(&self) -> usize {
        self.hymns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hymns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hymns.iter().map(String::as_str)
    }
}
