//! SQLite pool behind the persistent prompt store.

use exn::ResultExt;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

// One debounced writer plus a handful of concurrent readers.
const MAX_CONNECTIONS: u32 = 4;
// Batch writes land while readers are active; under WAL that only
// contends briefly, but not never.
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Connection pool for the on-disk prompt store. Cheap to clone; all clones
/// share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the prompt database at `path` and bring
    /// its schema up to date.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options().filename(path.as_ref()).create_if_missing(true);
        Self::from_options(options, MAX_CONNECTIONS).await
    }

    /// Open a throwaway in-memory database.
    ///
    /// Not gated behind `#[cfg(test)]` so dependent crates can use it in
    /// their own tests. Limited to a single connection: without a shared
    /// cache, each in-memory connection is its own empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::from_options(Self::options().filename(":memory:"), 1).await
    }

    async fn from_options(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connection options shared by the file and in-memory flavors. Every
    /// pragma lives here so the pool applies it to each connection it opens.
    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            // The table is capped at a few hundred short rows; reclaiming
            // pages is never worth the churn.
            .auto_vacuum(SqliteAutoVacuum::None)
            .pragma("wal_autocheckpoint", "800")
            .pragma("cache_size", "-2048")
            .pragma("temp_store", "MEMORY")
    }

    #[instrument("performing database migrations")]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drain and close the pool. The instance is unusable afterwards.
    pub async fn close(&self) {
        // Let SQLite refresh query planner statistics before shutdown.
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
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        // Journal mode can't be checked here: in-memory databases always
        // report "memory" regardless of the requested mode.
        let row: (i64,) = sqlx::query_as("PRAGMA synchronous").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1, "synchronous should be NORMAL");
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800, "WAL checkpoint should be 800");
        db.close().await;
    }

    #[tokio::test]
    async fn test_prompts_table_exists() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM prompts")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
        db.close().await;
    }
}
