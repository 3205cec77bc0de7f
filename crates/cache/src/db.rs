//! Connection pool for the cache database.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// One chunk of a batch fetch writes concurrently; more connections than that
// only queue behind the single WAL writer.
const MAX_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared SQLite pool behind every [`SqliteBackend`](crate::SqliteBackend).
///
/// Open one per database file and hand it to
/// [`SqliteBackend::new`](crate::SqliteBackend::new) once per bucket.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn open(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Query-based PRAGMAs must run on every pooled connection, not
            // just the first.
            .after_connect(|conn, meta| Box::pin(async move { Self::tune(conn, meta).await }))
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (or create) the database file at `path`, creating missing parent
    /// directories, and bring its schema up to date.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            // Blocking, but only once per process.
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
        }
        let options = Self::options().filename(path).create_if_missing(true);
        let db = Self::open(options, MAX_CONNECTIONS).await?;
        tracing::debug!(path = %path.display(), "Cache database open");
        Ok(db)
    }

    /// A private in-memory database, gone once closed.
    ///
    /// Not `#[cfg(test)]`: other crates use it in their tests too.
    pub async fn connect_in_memory() -> Result<Self> {
        // Every connection to `:memory:` gets its own database, so there can
        // only be one.
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            // A lost write after power failure is refetched on the next pass.
            .synchronous(SqliteSynchronous::Normal)
            // Writers of a whole chunk of blobs wait on each other.
            .busy_timeout(BUSY_TIMEOUT)
            // Eviction frees whole blobs at once; pages go back to the
            // filesystem on `reclaim`, not on every delete.
            .auto_vacuum(SqliteAutoVacuum::Incremental)
    }

    async fn tune(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 1000;
                PRAGMA cache_size = -4096;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("migrating cache database", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Return free pages to the filesystem, after an eviction sweep for
    /// instance. Failures are only logged.
    pub async fn reclaim(&self) {
        if let Err(e) = sqlx::query("PRAGMA incremental_vacuum").execute(&self.pool).await {
            tracing::debug!(error = %e, "Incremental vacuum failed");
        }
    }

    /// Wait for every connection to return to the pool, then close them.
    /// Backends built on this database report themselves unavailable
    /// afterwards.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.sqlite");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        db.reclaim().await;
        db.close().await;
    }

    #[tokio::test]
    async fn test_connection_is_tuned() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1000);
        let row: (i64,) = sqlx::query_as("PRAGMA temp_store").fetch_one(db.pool()).await.unwrap();
        // 2 = MEMORY
        assert_eq!(row.0, 2);
        db.close().await;
    }
}
