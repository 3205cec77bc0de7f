use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use chorale_storage::AssetUrl;
use exn::ResultExt;
use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};
use std::time::Duration;

/// How far a request may be satisfied by intermediate HTTP caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Ordinary request; proxies and the platform HTTP cache may answer.
    #[default]
    Normal,
    /// Ask every intermediary to revalidate with the origin.
    Reload,
}

/// Anything that can turn an asset URL into bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the full body of `url`.
    ///
    /// Only a 2xx response counts as success; anything else, including
    /// redirects that can't be followed, is an error.
    async fn fetch(&self, url: &AssetUrl, mode: FetchMode) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}
impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }

    /// Wrap an already configured client (shared connection pool, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn map_reqwest_error(err: &reqwest::Error, url: &AssetUrl) -> ErrorKind {
        if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_builder() {
            ErrorKind::InvalidUrl(url.to_string())
        } else if err.is_body() || err.is_decode() {
            ErrorKind::Body
        } else {
            ErrorKind::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &AssetUrl, mode: FetchMode) -> Result<Vec<u8>> {
        let mut request = self.client.get(url.as_str());
        if mode == FetchMode::Reload {
            request = request
                .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        let response = request.send().await.map_err(|e| Self::map_reqwest_error(&e, url))?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Non-success response");
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(|e| Self::map_reqwest_error(&e, url))?;
        tracing::trace!(url = %url, bytes = body.len(), "Fetched asset");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;

    async fn serve() -> String {
        let app = Router::new()
            .route("/audio/GEN_01.mp3", get(|| async { "in the beginning" }))
            .route("/missing.mp4", get(|| async { (StatusCode::NOT_FOUND, "not here") }))
            .route("/broken.mp4", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "oops") }))
            .route(
                "/echo-cache-control",
                get(|headers: HeaderMap| async move {
                    headers
                        .get(CACHE_CONTROL)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("none")
                        .to_string()
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "too late"
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), "chorale-test").unwrap()
    }

    fn url(base: &str, path: &str) -> AssetUrl {
        AssetUrl::new(format!("{base}{path}")).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base = serve().await;
        let body = fetcher().fetch(&url(&base, "/audio/GEN_01.mp3"), FetchMode::Normal).await.unwrap();
        assert_eq!(body, b"in the beginning");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let base = serve().await;
        let err = fetcher().fetch(&url(&base, "/missing.mp4"), FetchMode::Normal).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Status(404));
        let err = fetcher().fetch(&url(&base, "/broken.mp4"), FetchMode::Normal).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Status(500));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_reload_bypasses_caches() {
        let base = serve().await;
        let target = url(&base, "/echo-cache-control");
        let normal = fetcher().fetch(&target, FetchMode::Normal).await.unwrap();
        assert_eq!(normal, b"none");
        let reload = fetcher().fetch(&target, FetchMode::Reload).await.unwrap();
        assert_eq!(reload, b"no-cache");
    }

    #[tokio::test]
    async fn test_timeout() {
        let base = serve().await;
        let fetcher = HttpFetcher::new(Duration::from_millis(100), "chorale-test").unwrap();
        let err = fetcher.fetch(&url(&base, "/slow"), FetchMode::Normal).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = fetcher().fetch(&url(&format!("http://{addr}"), "/x.mp3"), FetchMode::Normal).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network(_)));
    }
}
