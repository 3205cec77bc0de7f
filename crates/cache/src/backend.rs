use crate::Database;
use crate::error::{ErrorKind as CacheErrorKind, Result as CacheResult};
use crate::models::{EntryRow, InfoRow};
use async_stream::stream;
use async_trait::async_trait;
use chorale_storage::error::{ErrorKind, Result};
use chorale_storage::{AssetUrl, CacheBackend, CacheEntry, EntryInfo};
use futures::{Stream, StreamExt};
use sqlx::SqlitePool;
use std::pin::Pin;
use time::UtcDateTime;

// SQLite primary result codes that mean the database as a whole is unusable.
const SQLITE_READONLY: i32 = 8;
const SQLITE_IOERR: i32 = 10;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;

/// Cache backend storing blobs in one bucket of a SQLite database.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    name: String,
    bucket: String,
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(db: &Database, bucket: impl Into<String>) -> CacheResult<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() || bucket.chars().any(|c| c.is_whitespace() || c.is_control()) {
            exn::bail!(CacheErrorKind::InvalidBucket(bucket));
        }
        Ok(Self { name: format!("sqlite:{bucket}"), bucket, pool: db.pool().clone() })
    }

    /// Change the name reported by [`CacheBackend::name`].
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn map_sqlx_error(&self, err: &sqlx::Error) -> ErrorKind {
        match err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                ErrorKind::Unavailable(format!("{}: {err}", self.name))
            },
            sqlx::Error::Database(db)
                if db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    // Extended result codes carry the primary code in the low byte.
                    .is_some_and(|code| {
                        matches!(code & 0xff, SQLITE_READONLY | SQLITE_IOERR | SQLITE_FULL | SQLITE_CANTOPEN)
                    }) =>
            {
                ErrorKind::Unavailable(format!("{}: {err}", self.name))
            },
            _ => ErrorKind::BackendError(err.to_string()),
        }
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| self.map_sqlx_error(&e))?;
        Ok(())
    }

    fn list_stream(&self) -> Pin<Box<dyn Stream<Item = Result<EntryInfo>> + Send + '_>> {
        Box::pin(stream! {
            let mut rows = sqlx::query_as::<_, InfoRow>(include_str!("../queries/list_entries.sql"))
                .bind(&self.bucket)
                .fetch(&self.pool);
            while let Some(row) = rows.next().await {
                match row {
                    Ok(row) => {
                        yield EntryInfo::try_from(row);
                    },
                    Err(e) => {
                        yield Err(self.map_sqlx_error(&e).into());
                        return;
                    },
                }
            }
        })
    }

    async fn exists(&self, url: &AssetUrl) -> Result<bool> {
        let (exists,): (i64,) = sqlx::query_as(include_str!("../queries/exists_entry.sql"))
            .bind(&self.bucket)
            .bind(url.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.map_sqlx_error(&e))?;
        Ok(exists != 0)
    }

    async fn get(&self, url: &AssetUrl) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_entry.sql"))
            .bind(&self.bucket)
            .bind(url.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.map_sqlx_error(&e))?;
        row.map(CacheEntry::try_from).transpose()
    }

    async fn put(&self, url: &AssetUrl, blob: &[u8]) -> Result<()> {
        let size = i64::try_from(blob.len()).map_err(|_| ErrorKind::BackendError("blob too large".to_string()))?;
        sqlx::query(include_str!("../queries/upsert_entry.sql"))
            .bind(&self.bucket)
            .bind(url.as_str())
            .bind(blob)
            .bind(size)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_sqlx_error(&e))?;
        tracing::trace!(backend = %self.name, %url, size, "Stored entry");
        Ok(())
    }

    async fn delete(&self, url: &AssetUrl) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(&self.bucket)
            .bind(url.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_sqlx_error(&e))?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(url.clone()));
        }
        Ok(())
    }

    async fn stat(&self, url: &AssetUrl) -> Result<EntryInfo> {
        let row: Option<InfoRow> = sqlx::query_as(include_str!("../queries/stat_entry.sql"))
            .bind(&self.bucket)
            .bind(url.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.map_sqlx_error(&e))?;
        match row {
            Some(row) => EntryInfo::try_from(row),
            None => exn::bail!(ErrorKind::NotFound(url.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn url(s: &str) -> AssetUrl {
        AssetUrl::new(s).unwrap()
    }

    async fn backend(bucket: &str) -> (Database, SqliteBackend) {
        let db = Database::connect_in_memory().await.unwrap();
        let backend = SqliteBackend::new(&db, bucket).unwrap();
        (db, backend)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_db, backend) = backend("media").await;
        let key = url("https://cdn.example.org/audio/PSA_023.mp3");
        backend.put(&key, b"the lord is my shepherd").await.unwrap();

        let entry = backend.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.url, key);
        assert_eq!(entry.blob, b"the lord is my shepherd");
        let info = backend.stat(&key).await.unwrap();
        assert_eq!(info.size, 23);
        assert!(backend.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_db, backend) = backend("media").await;
        let key = url("https://cdn.example.org/video/hymn.mp4");
        backend.put(&key, b"old").await.unwrap();
        backend.put(&key, b"newer").await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap().unwrap().blob, b"newer");
        assert_eq!(backend.list_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_db, backend) = backend("media").await;
        assert!(backend.get(&url("https://cdn.example.org/nope")).await.unwrap().is_none());
        let err = backend.stat(&url("https://cdn.example.org/nope")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_db, backend) = backend("media").await;
        let key = url("https://cdn.example.org/audio/JUD_01.mp3");
        backend.put(&key, b"x").await.unwrap();
        backend.delete(&key).await.unwrap();
        assert!(!backend.exists(&key).await.unwrap());
        let err = backend.delete(&key).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let db = Database::connect_in_memory().await.unwrap();
        let media = SqliteBackend::new(&db, "media").unwrap();
        let manifest = SqliteBackend::new(&db, "manifest").unwrap();
        let key = url("https://cdn.example.org/hymns.json");

        manifest.put(&key, br#"{"hymns":[]}"#).await.unwrap();

        assert!(!media.exists(&key).await.unwrap());
        assert!(media.list_keys().await.unwrap().is_empty());
        assert!(matches!(&*media.delete(&key).await.unwrap_err(), ErrorKind::NotFound(_)));
        assert!(manifest.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let (_db, backend) = backend("media").await;
        for key in ["https://b.example/2", "https://a.example/1", "https://c.example/3"] {
            backend.put(&url(key), b"x").await.unwrap();
        }
        let keys: Vec<_> = backend.list_keys().await.unwrap().into_iter().map(AssetUrl::into_string).collect();
        assert_eq!(keys, vec!["https://a.example/1", "https://b.example/2", "https://c.example/3"]);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let (db, backend) = backend("media").await;
        db.close().await;
        let err = backend.ping().await.unwrap_err();
        assert!(err.is_unavailable());
        let err = backend.put(&url("https://cdn.example.org/x"), b"x").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[rstest]
    #[case("")]
    #[case("two words")]
    #[case("tab\t")]
    #[tokio::test]
    async fn test_invalid_bucket(#[case] bucket: &str) {
        let db = Database::connect_in_memory().await.unwrap();
        let err = SqliteBackend::new(&db, bucket).unwrap_err();
        assert!(matches!(&*err, CacheErrorKind::InvalidBucket(_)));
    }

    #[tokio::test]
    async fn test_name() {
        let (_db, backend) = backend("runtime").await;
        assert_eq!(backend.name(), "sqlite:runtime");
        assert_eq!(backend.bucket(), "runtime");
        assert_eq!(backend.with_name("pages").name(), "pages");
    }
}
