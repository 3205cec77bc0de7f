//! Local filesystem cache backend.
//!
//! Keys are URLs, which make terrible filenames, so each entry is stored under
//! the BLAKE3 hash of its key: the blob in `<hash>.blob` and a JSON sidecar in
//! `<hash>.json` recording the original key and when it was stored. Entries
//! are sharded into sub-directories by the first two hex characters of the
//! hash to keep directory sizes sane for a few thousand audio chapters.
//!
//! ```text
//! root/
//!   3f/
//!     3fa2…c1.blob
//!     3fa2…c1.json   {"url":"https://…/GEN_01.mp3","size":1234,"stored_at":1760000000}
//! ```
//!
//! The sidecar is the source of truth for whether a key exists: it is written
//! last on `put` and removed first on `delete`.

use crate::backend::EntryInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{AssetUrl, CacheBackend, CacheEntry, EntryInfo};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use time::UtcDateTime;
use tokio::fs::{self, DirEntry};

const BLOB_EXTENSION: &str = "blob";
const SIDECAR_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

// Unique suffix for temporary files so two concurrent writes of the same key
// never share a temporary file (last rename wins instead).
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    url: String,
    size: u64,
    stored_at: i64,
}
impl Sidecar {
    fn into_info(self, path: &Path) -> Result<EntryInfo> {
        let url = AssetUrl::new(self.url).or_raise(|| ErrorKind::BackendError(format!("bad sidecar {}", path.display())))?;
        let stored_at = UtcDateTime::from_unix_timestamp(self.stored_at)
            .or_raise(|| ErrorKind::Corrupt(url.clone()))?;
        Ok(EntryInfo { url, size: self.size, stored_at })
    }
}

enum WalkEntry {
    Entry(EntryInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem cache backend.
///
/// # Examples
///
/// ```no_run
/// use chorale_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("media", "/var/cache/chorale/media")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory for the cache
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists and is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::Unavailable(format!("cache root must be absolute: {}", root.display())));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::Unavailable(format!("cache root is not a directory: {}", root.display())));
            }
        } else {
            // Use non-async here; it'll only happen once on initialization
            // and it's not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, None))?;
        }
        Ok(Self { name: name.into(), root })
    }

    fn digest(url: &AssetUrl) -> String {
        blake3::hash(url.as_str().as_bytes()).to_hex().to_string()
    }

    fn shard(&self, digest: &str) -> PathBuf {
        self.root.join(&digest[..2])
    }

    fn blob_path(&self, url: &AssetUrl) -> PathBuf {
        let digest = Self::digest(url);
        self.shard(&digest).join(format!("{digest}.{BLOB_EXTENSION}"))
    }

    fn sidecar_path(&self, url: &AssetUrl) -> PathBuf {
        let digest = Self::digest(url);
        self.shard(&digest).join(format!("{digest}.{SIDECAR_EXTENSION}"))
    }

    fn temp_path(target: &Path) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = target.as_os_str().to_owned();
        name.push(format!(".{}-{n}.{TEMP_EXTENSION}", std::process::id()));
        PathBuf::from(name)
    }

    /// Errors that mean "this whole directory is unusable" are mapped to
    /// [`Unavailable`](ErrorKind::Unavailable); the rest stay per-entry.
    fn map_io_error(e: std::io::Error, url: Option<&AssetUrl>) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match (e.kind(), url) {
            (Io::NotFound, Some(url)) => ErrorKind::NotFound(url.clone()),
            (Io::PermissionDenied | Io::ReadOnlyFilesystem | Io::StorageFull | Io::QuotaExceeded, _) => {
                ErrorKind::Unavailable(e.to_string())
            },
            _ => ErrorKind::Io(e),
        }
    }

    async fn read_sidecar(&self, url: &AssetUrl) -> Result<Option<EntryInfo>> {
        let path = self.sidecar_path(url);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => exn::bail!(Self::map_io_error(e, Some(url))),
        };
        let sidecar: Sidecar = serde_json::from_slice(&raw).or_raise(|| ErrorKind::Corrupt(url.clone()))?;
        let info = sidecar.into_info(&path)?;
        // Two different keys hashing to the same digest would be astronomically
        // unlucky, but serving the wrong blob would be worse than an error.
        if &info.url != url {
            exn::bail!(ErrorKind::Corrupt(url.clone()));
        }
        Ok(Some(info))
    }

    /// Write to a temporary sibling, then rename over the target so readers
    /// never observe a half-written file.
    async fn write_atomic(target: &Path, data: &[u8], url: &AssetUrl) -> Result<()> {
        let temp = Self::temp_path(target);
        if let Err(e) = fs::write(&temp, data).await {
            _ = fs::remove_file(&temp).await;
            exn::bail!(Self::map_io_error(e, Some(url)));
        }
        if let Err(e) = fs::rename(&temp, target).await {
            _ = fs::remove_file(&temp).await;
            exn::bail!(Self::map_io_error(e, Some(url)));
        }
        Ok(())
    }

    async fn process_entry(&self, entry: DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, None))?;
        if file_type.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if !file_type.is_file() || path.extension().is_none_or(|ext| ext != SIDECAR_EXTENSION) {
            // Blobs, leftover temporary files and anything else.
            return Ok(WalkEntry::Skip);
        }
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            // Deleted between listing the directory and reading it.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WalkEntry::Skip),
            Err(e) => match Self::map_io_error(e, None) {
                kind @ ErrorKind::Unavailable(_) => exn::bail!(kind),
                kind => {
                    tracing::warn!(backend = %self.name, path = %path.display(), error = %kind, "Skipping unreadable sidecar");
                    return Ok(WalkEntry::Skip);
                },
            },
        };
        // A single damaged sidecar must not hide every other entry.
        let info = serde_json::from_slice::<Sidecar>(&raw)
            .or_raise(|| ErrorKind::BackendError(format!("unreadable sidecar {}", path.display())))
            .and_then(|sidecar| sidecar.into_info(&path));
        match info {
            Ok(info) => Ok(WalkEntry::Entry(info)),
            Err(e) => {
                tracing::warn!(backend = %self.name, path = %path.display(), error = %e, "Skipping corrupt sidecar");
                Ok(WalkEntry::Skip)
            },
        }
    }
}

#[async_trait]
impl CacheBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {},
            Ok(_) => exn::bail!(ErrorKind::Unavailable(format!("not a directory: {}", self.root.display()))),
            Err(e) => exn::bail!(ErrorKind::Unavailable(format!("{}: {e}", self.root.display()))),
        }
        if fs::metadata(&self.root).await.is_ok_and(|meta| meta.permissions().readonly()) {
            exn::bail!(ErrorKind::Unavailable(format!("read-only: {}", self.root.display())));
        }
        Ok(())
    }

    fn list_stream(&self) -> EntryInfoStream<'_> {
        let mut stack = vec![self.root.clone()];
        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // A shard removed by someone else mid-walk is just empty.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, None)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, None))); continue 'entries; },
                    };
                    match self.process_entry(entry).await {
                        Ok(WalkEntry::Entry(info)) => yield Ok(info),
                        Ok(WalkEntry::Descend(dir)) => stack.push(dir),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, url: &AssetUrl) -> Result<bool> {
        Ok(self.read_sidecar(url).await?.is_some())
    }

    async fn get(&self, url: &AssetUrl) -> Result<Option<CacheEntry>> {
        let Some(info) = self.read_sidecar(url).await? else {
            return Ok(None);
        };
        let blob = match fs::read(self.blob_path(url)).await {
            Ok(blob) => blob,
            // Sidecar without a blob: only possible if something outside this
            // backend tampered with the directory.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::Corrupt(url.clone())),
            Err(e) => exn::bail!(Self::map_io_error(e, Some(url))),
        };
        Ok(Some(CacheEntry::new(info.url, blob, info.stored_at)))
    }

    async fn put(&self, url: &AssetUrl, blob: &[u8]) -> Result<()> {
        let blob_path = self.blob_path(url);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, Some(url)))?;
        }
        let sidecar = Sidecar {
            url: url.to_string(),
            size: blob.len() as u64,
            stored_at: UtcDateTime::now().unix_timestamp(),
        };
        let sidecar = serde_json::to_vec(&sidecar).or_raise(|| ErrorKind::BackendError("sidecar encoding".to_string()))?;
        Self::write_atomic(&blob_path, blob, url).await?;
        Self::write_atomic(&self.sidecar_path(url), &sidecar, url).await?;
        tracing::trace!(backend = %self.name, %url, bytes = blob.len(), "Stored cache entry");
        Ok(())
    }

    async fn delete(&self, url: &AssetUrl) -> Result<()> {
        fs::remove_file(self.sidecar_path(url)).await.map_err(|e| Self::map_io_error(e, Some(url)))?;
        match fs::remove_file(self.blob_path(url)).await {
            Ok(()) => Ok(()),
            // The key is already gone; an orphaned blob is only wasted space.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::warn!(backend = %self.name, %url, error = %e, "Removed cache entry but its blob lingers");
                Ok(())
            },
        }
    }

    async fn stat(&self, url: &AssetUrl) -> Result<EntryInfo> {
        match self.read_sidecar(url).await? {
            Some(info) => Ok(info),
            None => exn::bail!(ErrorKind::NotFound(url.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> AssetUrl {
        AssetUrl::new(s).unwrap()
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested/cache");
        LocalBackend::new("name", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_paths_are_sharded_by_digest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let key = url("https://media.example.org/audio/GEN_01.mp3");
        let digest = LocalBackend::digest(&key);
        assert_eq!(digest.len(), 64);
        assert_eq!(backend.blob_path(&key), temp_dir.path().join(&digest[..2]).join(format!("{digest}.blob")));
        assert_eq!(backend.sidecar_path(&key), temp_dir.path().join(&digest[..2]).join(format!("{digest}.json")));
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let key = url("https://media.example.org/audio/GEN_01.mp3");
        backend.put(&key, b"ID3 audio").await.unwrap();
        let entry = backend.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.url, key);
        assert_eq!(entry.blob, b"ID3 audio");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        assert!(backend.get(&url("https://nowhere.example/x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let key = url("https://media.example.org/video/hymn.mp4");
        backend.put(&key, b"first").await.unwrap();
        backend.put(&key, b"second version").await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap().unwrap().blob, b"second version");
        assert_eq!(backend.stat(&key).await.unwrap().size, 14);
        assert_eq!(backend.list_keys().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_put_leaves_no_temporary_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let key = url("https://media.example.org/video/hymn.mp4");
        backend.put(&key, b"data").await.unwrap();
        let digest = LocalBackend::digest(&key);
        let mut names = std::fs::read_dir(temp_dir.path().join(&digest[..2]))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec![format!("{digest}.blob"), format!("{digest}.json")]);
    }

    #[tokio::test]
    async fn test_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let key = url("https://media.example.org/audio/PSA_150.mp3");
        assert!(!backend.exists(&key).await.unwrap());
        backend.put(&key, b"data").await.unwrap();
        assert!(backend.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let key = url("https://media.example.org/audio/PSA_150.mp3");
        backend.put(&key, b"data").await.unwrap();
        backend.delete(&key).await.unwrap();
        assert!(!backend.exists(&key).await.unwrap());
        assert!(!backend.blob_path(&key).exists());
        // Deleting nonexistent entry returns error
        let err = backend.delete(&key).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let err = backend.stat(&url("https://nowhere.example/x")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        assert!(backend.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_returns_all_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let keys = [
            url("https://media.example.org/audio/GEN_01.mp3"),
            url("https://media.example.org/audio/GEN_02.mp3"),
            url("https://media.example.org/video/hymn.mp4"),
        ];
        for key in &keys {
            backend.put(key, key.as_str().as_bytes()).await.unwrap();
        }
        // Stray files are not entries.
        std::fs::write(temp_dir.path().join("README"), b"not a cache entry").unwrap();
        let mut listed = backend.list_keys().await.unwrap();
        listed.sort();
        assert_eq!(listed, keys.to_vec());
    }

    #[tokio::test]
    async fn test_sidecar_mismatch_is_corrupt() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let key = url("https://media.example.org/audio/GEN_01.mp3");
        backend.put(&key, b"data").await.unwrap();
        let forged = r#"{"url":"https://media.example.org/other.mp3","size":4,"stored_at":0}"#;
        std::fs::write(backend.sidecar_path(&key), forged).unwrap();
        let err = backend.get(&key).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_sidecars() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let key = url("https://media.example.org/audio/GEN_01.mp3");
        backend.put(&key, b"data").await.unwrap();
        let shard = temp_dir.path().join("ab");
        std::fs::create_dir_all(&shard).unwrap();
        std::fs::write(shard.join("ab00.json"), b"").unwrap();
        std::fs::write(shard.join("ab01.json"), br#"{"url":"two words","size":1,"stored_at":0}"#).unwrap();

        assert_eq!(backend.list_keys().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_ping() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("cache");
        let backend = LocalBackend::new("name", &root).unwrap();
        backend.ping().await.unwrap();
        std::fs::remove_dir_all(&root).unwrap();
        let err = backend.ping().await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
