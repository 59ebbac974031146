//! Database connection pool management
//!
//! Wraps SQLx's `SqlitePool` with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - Foreign-key enforcement (folder removal cascades)
//! - Forward-only schema migrations applied at open
//! - In-memory mode for testing

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::StoreError;

/// Ordered, forward-only migrations; append new entries, never edit old ones.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("migrations/0001_initial.sql"))];

/// Manages a pool of SQLite connections for BaluDesk state persistence
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - 5 max connections for file-based databases
/// - 1 connection for in-memory databases (required for data persistence)
/// - 5-second busy timeout to handle write contention
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Creates a new database pool connected to the specified file
    ///
    /// Creates parent directories and the database file as needed, enables
    /// WAL mode and foreign keys, and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionFailed`] if the connection cannot be
    /// established, or [`StoreError::MigrationFailed`] if migrations fail.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::ConnectionFailed(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(path = %db_path.display(), "Database pool initialized");

        Ok(Self { pool })
    }

    /// Creates an in-memory database pool for testing
    ///
    /// Uses a single connection to ensure data persistence across queries
    /// (SQLite in-memory databases are per-connection).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options: SqliteConnectOptions = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool, flushing the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Applies every migration with a version above the recorded maximum
    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version    INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
             );",
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("migrations table: {}", e)))?;

        let current: i64 =
            sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM schema_migrations")
                .fetch_one(pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("version query: {}", e)))?
                .get("version");

        for (version, sql) in MIGRATIONS {
            if *version <= current {
                continue;
            }

            let mut tx = pool
                .begin()
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("begin: {}", e)))?;

            sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("migration {}: {}", version, e)))?;

            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("record {}: {}", version, e)))?;

            tx.commit()
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("commit {}: {}", version, e)))?;

            tracing::debug!(version, "Applied schema migration");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_pool_migrates() {
        let pool = DatabasePool::in_memory().await.unwrap();
        let version: i64 =
            sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM schema_migrations")
                .fetch_one(pool.pool())
                .await
                .unwrap()
                .get("version");
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn migrations_are_idempotent_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        let first = DatabasePool::open(&path).await.unwrap();
        first.close().await;

        // Re-opening must not attempt to re-apply version 1.
        let second = DatabasePool::open(&path).await.unwrap();
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM schema_migrations")
            .fetch_one(second.pool())
            .await
            .unwrap()
            .get("n");
        assert_eq!(count, 1);
    }
}
