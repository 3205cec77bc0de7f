use crate::error::{ErrorKind, Result};
use chorale_storage::AssetUrl;
use exn::ResultExt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A top-level document load; gets the offline fallback when it fails.
    Navigation,
    /// Anything else: scripts, styles, images, JSON, media.
    Resource,
}

/// A live request intercepted by the router.
///
/// The fragment is dropped on construction since it never reaches the server
/// and mustn't split one resource across several cache keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: Url,
    kind: RequestKind,
}
impl Request {
    pub fn new(url: &str, kind: RequestKind) -> Result<Self> {
        let mut url = Url::parse(url).or_raise(|| ErrorKind::InvalidRequest(url.to_string()))?;
        url.set_fragment(None);
        Ok(Self { url, kind })
    }

    pub fn navigation(url: &str) -> Result<Self> {
        Self::new(url, RequestKind::Navigation)
    }

    pub fn resource(url: &str) -> Result<Self> {
        Self::new(url, RequestKind::Resource)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn is_navigation(&self) -> bool {
        self.kind == RequestKind::Navigation
    }

    /// Key the response is cached under: the full URL without its fragment.
    pub(crate) fn cache_key(&self) -> Result<AssetUrl> {
        AssetUrl::new(self.url.as_str()).or_raise(|| ErrorKind::InvalidRequest(self.url.to_string()))
    }
}
