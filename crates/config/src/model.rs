use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_CHUNK_SIZE: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub router: RouterConfig,
    /// Replaces the built-in 66-book table when present.
    pub catalog: Option<Vec<BookConfig>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevalidatePolicy {
    #[default]
    Always,
    MissingOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub audio_base: String,
    pub video_base: String,
    pub manifest_url: String,
    /// Key the last good manifest is stored under; the manifest URL if unset.
    pub manifest_key: Option<String>,
    pub chunk_size: usize,
    pub revalidate: RevalidatePolicy,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            audio_base: String::new(),
            video_base: String::new(),
            manifest_url: String::new(),
            manifest_key: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            revalidate: RevalidatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: concat!("chorale/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// One blob file per entry under a directory per bucket.
    Local,
    /// A single SQLite database holding every bucket.
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Database file (`sqlite`) or root directory (`local`); under the
    /// platform data directory if unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Origin of the application itself, served stale-while-revalidate.
    pub app_origin: Option<String>,
    /// Network-first hosts; the manifest URL's host if empty.
    pub manifest_hosts: Vec<String>,
    /// Network-only hosts; the hosts of both media bases if empty.
    pub media_hosts: Vec<String>,
    /// Network-only path prefixes.
    pub live_paths: Vec<String>,
    /// URL of the document served for failed navigations.
    pub offline_document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookConfig {
    pub name: String,
    pub chapters: u16,
    pub audio_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u8>,
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    if value.trim().is_empty() {
        exn::bail!(ErrorKind::Invalid(format!("{field} is required")));
    }
    match Url::parse(value) {
        Ok(url) if url.has_host() => Ok(url),
        _ => exn::bail!(ErrorKind::Invalid(format!("{field} is not an absolute URL: {value:?}"))),
    }
}

impl Config {
    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.sync.chunk_size == 0 {
            exn::bail!(ErrorKind::Invalid("sync.chunk_size must be at least 1".to_string()));
        }
        if self.http.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("http.timeout_secs must be at least 1".to_string()));
        }
        parse_url("sync.audio_base", &self.sync.audio_base)?;
        parse_url("sync.video_base", &self.sync.video_base)?;
        parse_url("sync.manifest_url", &self.sync.manifest_url)?;
        if self.sync.audio_base.trim_end_matches('/') == self.sync.video_base.trim_end_matches('/') {
            exn::bail!(ErrorKind::Invalid("sync.audio_base and sync.video_base must differ".to_string()));
        }
        if let Some(key) = &self.sync.manifest_key
            && (key.is_empty() || key.chars().any(|c| c.is_whitespace() || c.is_control()))
        {
            exn::bail!(ErrorKind::Invalid(format!("sync.manifest_key is not a usable key: {key:?}")));
        }
        if let Some(origin) = &self.router.app_origin {
            parse_url("router.app_origin", origin)?;
        }
        if let Some(document) = &self.router.offline_document {
            parse_url("router.offline_document", document)?;
        }
        if let Some(prefix) = self.router.live_paths.iter().find(|prefix| !prefix.starts_with('/')) {
            exn::bail!(ErrorKind::Invalid(format!("router.live_paths entries must start with '/': {prefix:?}")));
        }
        if let Some(books) = &self.catalog
            && let Some(book) = books.iter().find(|book| book.chapters == 0)
        {
            exn::bail!(ErrorKind::Invalid(format!("catalog book {:?} has no chapters", book.name)));
        }
        Ok(())
    }

    /// Hosts routed network-first, defaulting to the manifest's host.
    pub fn manifest_hosts(&self) -> Vec<String> {
        if !self.router.manifest_hosts.is_empty() {
            return self.router.manifest_hosts.clone();
        }
        Url::parse(&self.sync.manifest_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .into_iter()
            .collect()
    }

    /// Hosts routed network-only, defaulting to the hosts of both media bases.
    pub fn media_hosts(&self) -> Vec<String> {
        if !self.router.media_hosts.is_empty() {
            return self.router.media_hosts.clone();
        }
        let mut hosts = Vec::new();
        for base in [&self.sync.audio_base, &self.sync.video_base] {
            if let Some(host) = Url::parse(base).ok().and_then(|url| url.host_str().map(str::to_string))
                && !hosts.contains(&host)
            {
                hosts.push(host);
            }
        }
        hosts
    }
}
