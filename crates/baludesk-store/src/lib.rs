//! BaluDesk Store - SQLite persistence
//!
//! Provides:
//! - [`DatabasePool`] - connection pool with WAL mode and schema migrations
//! - [`SqliteStateStore`] - the [`StateStore`](baludesk_core::ports::StateStore)
//!   implementation backed by a single embedded database file

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteStateStore;

use thiserror::Error;

/// Errors raised by the SQLite adapter
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open or create the database
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed; the store must not be used
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped back to a domain type
    #[error("Stored value could not be decoded: {0}")]
    Decode(String),

    /// Underlying SQLx failure
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
