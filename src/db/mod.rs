//! Database module for persistent storage of indexed blocks.
//!
//! This module provides SQLite-based storage for:
//! - Tokens and pairs discovered by pair resolution
//! - One row per attached DEX event
//! - The finished-block watermark used to resume
//!
//! # Architecture
//!
//! - `models`: Data structures that map to database tables
//! - `repository`: Block commit and queries
//! - [`DbSink`]: the [`ResultSink`] that writes committed blocks
//! - Connection pooling with SQLite WAL mode for concurrency
//! - Migration system for schema versioning

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{IndexerError, IndexerResult};
use crate::publisher::{BlockMessage, ResultSink};
use crate::types::BlockResult;

pub mod models;
pub mod repository;

pub use repository::Repository;

/// Creates a SQLite connection pool, applies migrations and checks the schema.
///
/// # Configuration
///
/// - **WAL mode**: Enables concurrent readers during writes
/// - **Busy timeout**: 30 seconds to handle lock contention
/// - **Max connections**: 5, or 1 for in-memory databases where every
///   connection would otherwise open its own empty database
///
/// # Example
///
/// ```no_run
/// use dex_block_indexer::db::create_pool;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool("sqlite:./indexer.db").await?;
///     Ok(())
/// }
/// ```
///
/// # Errors
///
/// Returns a database error when the URL is invalid, the connection fails or
/// migrations cannot be applied.
pub async fn create_pool(database_url: &str) -> IndexerResult<SqlitePool> {
    info!(database_url, "Connecting to database");

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            IndexerError::database(
                format!("Failed to parse database URL: {database_url}"),
                Some(Box::new(e)),
            )
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| {
            IndexerError::database(
                format!("Failed to connect to database at {database_url}"),
                Some(Box::new(e)),
            )
        })?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to enable foreign keys".to_string(), Some(Box::new(e)))
        })?;

    info!("Running database migrations");
    run_migrations(&pool).await?;
    verify_database(&pool).await?;
    info!("Database migrations complete");

    Ok(pool)
}

/// Runs database migrations to ensure schema is up-to-date.
///
/// # Errors
///
/// Returns a database error if a migration fails.
pub async fn run_migrations(pool: &SqlitePool) -> IndexerResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            IndexerError::database(
                "Failed to run database migrations".to_string(),
                Some(Box::new(e)),
            )
        })?;

    Ok(())
}

/// Verify that required tables exist after migrations.
///
/// # Errors
///
/// Returns a database error when a table is missing.
pub async fn verify_database(pool: &SqlitePool) -> IndexerResult<()> {
    let rows = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT name FROM sqlite_master
        WHERE type='table' AND name IN ('tokens', 'pairs', 'transactions', 'indexer_state')
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| {
        IndexerError::database("Failed to verify database schema".to_string(), Some(Box::new(e)))
    })?;

    if rows.len() < 4 {
        return Err(IndexerError::database(
            format!("Database schema incomplete. Expected 4 tables, found {}", rows.len()),
            None,
        ));
    }

    Ok(())
}

/// Sink persisting every committed block through a [`Repository`].
#[derive(Debug, Clone)]
pub struct DbSink {
    repository: Repository,
}

impl DbSink {
    /// Sink writing through `repository`.
    #[must_use]
    pub const fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Repository used by the sink.
    #[must_use]
    pub const fn repository(&self) -> &Repository {
        &self.repository
    }
}

#[async_trait]
impl ResultSink for DbSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn publish(&self, result: &BlockResult, _message: &Arc<BlockMessage>) -> IndexerResult<()> {
        self.repository.commit_block(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_and_migrations() {
        let pool = create_pool("sqlite::memory:")
            .await
            .expect("Failed to create pool");

        // Migrations are idempotent
        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table'")
            .fetch_one(&pool)
            .await
            .expect("Failed to query tables");

        // 4 tables + migration history (+ sqlite_sequence)
        assert!(result.0 >= 5, "Expected at least 5 tables, got {}", result.0);
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_pool("sqlite::memory:")
            .await
            .expect("Failed to create pool");

        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("Failed to query foreign keys");

        assert_eq!(result.0, 1, "Foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite:{}", dir.path().join("indexer.db").display());

        let sink = DbSink::new(Repository::new(create_pool(&url).await.unwrap()));
        let result = BlockResult::new(42, 1_700_000_000, 1.0);
        let message = Arc::new(BlockMessage::from(&result));
        sink.publish(&result, &message).await.unwrap();
        sink.repository().pool().close().await;

        let reopened = Repository::new(create_pool(&url).await.unwrap());
        assert_eq!(reopened.finished_block().await.unwrap(), Some(42));
    }
}
