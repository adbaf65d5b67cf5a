//! SQLite store shared by the listener and the front-end.
//!
//! Each process opens its own [`Database`] on the same file. SQLite's
//! locking serializes the writers.

mod account;
mod repository;
mod schema;

pub use account::{Account, NewAccount};
pub use repository::AccountRepository;
pub use schema::MIGRATIONS;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::{Result, WebmailError};

/// Connection pool type used by the repositories.
pub type DbPool = SqlitePool;

/// How long a writer waits on a lock held by the other process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper owning a connection pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the database at the specified path.
    ///
    /// The file is created if it doesn't exist and migrations are applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_max_connections(path, 5).await
    }

    /// Open the database described by the configuration.
    pub async fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open_with_max_connections(&config.path, config.max_connections).await
    }

    async fn open_with_max_connections(path: impl AsRef<Path>, max: u32) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening mail store");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(options)
            .await
            .map_err(|e| WebmailError::DatabaseConnection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// The pool holds exactly one connection that is never recycled, since
    /// every in-memory connection would otherwise see its own empty database.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory database");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| WebmailError::DatabaseConnection(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| WebmailError::DatabaseConnection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Highest applied migration, 0 on a fresh file.
    pub async fn schema_version(&self) -> Result<i64> {
        if !self.table_exists("schema_version").await? {
            return Ok(0);
        }

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Apply pending migrations.
    ///
    /// Both processes may race here on a fresh file; every migration is
    /// idempotent and the version row is inserted with `OR IGNORE`.
    pub async fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version().await?;

        if current_version as usize >= MIGRATIONS.len() {
            debug!(version = current_version, "Schema current");
            return Ok(());
        }

        info!(from = current_version, to = MIGRATIONS.len(), "Migrating schema");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     INTEGER PRIMARY KEY,
                applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            debug!(version, "Migration applied");
        }

        Ok(())
    }

    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
        )
        .bind(table_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_tables_exist() {
        let db = Database::open_in_memory().await.unwrap();

        assert!(db.table_exists("users").await.unwrap());
        assert!(db.table_exists("inbox").await.unwrap());
        assert!(db.table_exists("sent").await.unwrap());
        assert!(db.table_exists("schema_version").await.unwrap());
        assert!(!db.table_exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_important_defaults_to_false() {
        let db = Database::open_in_memory().await.unwrap();

        sqlx::query("INSERT INTO inbox (sender, recipient, subject, body) VALUES (?, ?, ?, ?)")
            .bind("a@example.com")
            .bind("b@example.com")
            .bind("Hi")
            .bind("Body")
            .execute(db.pool())
            .await
            .unwrap();

        let flag: bool = sqlx::query_scalar("SELECT is_important FROM inbox WHERE id = 1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(!flag);
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let db = Database::open_in_memory().await.unwrap();

        {
            let mut tx = db.pool().begin().await.unwrap();
            sqlx::query("INSERT INTO sent (sender, receiver, subject, body) VALUES (?, ?, ?, ?)")
                .bind("a@example.com")
                .bind("b@example.com")
                .bind("s")
                .bind("b")
                .execute(&mut *tx)
                .await
                .unwrap();
            // Dropped without commit.
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sent")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_open_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("inbox.db");

        let first = Database::open(&path).await.unwrap();
        let second = Database::open(&path).await.unwrap();

        assert_eq!(
            second.schema_version().await.unwrap() as usize,
            MIGRATIONS.len()
        );

        sqlx::query("INSERT INTO sent (sender, receiver, subject, body) VALUES (?, ?, ?, ?)")
            .bind("a@example.com")
            .bind("b@example.com")
            .bind("s")
            .bind("b")
            .execute(first.pool())
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sent")
            .fetch_one(second.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        first.close().await;
        second.close().await;
    }
}
