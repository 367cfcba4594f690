//! Repository pattern for database operations.
//!
//! Provides the block commit used by the SQLite sink, the persisted
//! watermark and the counts shown by `status`. Every write is an upsert keyed
//! by a natural primary key, so redelivering a block is harmless.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, instrument};

use super::models::{to_i64, IndexerStats, PairRecord, TokenRecord, TransactionRecord};
use crate::error::{IndexerError, IndexerResult};
use crate::types::BlockResult;

/// Repository for database operations.
///
/// Wraps a SQLite connection pool and provides type-safe methods
/// for all database interactions.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Creates a new repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ==================== BLOCK COMMIT ====================

    /// Persist one block: new tokens, new pairs, every event and the
    /// watermark, in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns a database error if any statement fails; nothing is written
    /// in that case.
    #[instrument(skip(self, result), fields(block = result.block_number, events = tracing::field::Empty, duration_ms = tracing::field::Empty))]
    pub async fn commit_block(&self, result: &BlockResult) -> IndexerResult<()> {
        let start = std::time::Instant::now();

        let mut tx = self.pool.begin().await.map_err(|e| {
            IndexerError::database("Failed to start transaction".to_string(), Some(Box::new(e)))
        })?;

        for token in result.new_tokens.values() {
            upsert_token(&mut tx, &TokenRecord::from_token(token)?).await?;
        }
        for pair in result.new_pairs.values() {
            upsert_pair(&mut tx, &PairRecord::from_pair(pair)?).await?;
        }

        let mut events = 0usize;
        for tx_result in &result.txs {
            for event in &tx_result.events {
                let record = TransactionRecord::from_event(tx_result, event, result.native_price)?;
                upsert_transaction(&mut tx, &record).await?;
                events += 1;
            }
        }

        set_finished_block(&mut tx, result.block_number).await?;

        tx.commit().await.map_err(|e| {
            IndexerError::database("Failed to commit transaction".to_string(), Some(Box::new(e)))
        })?;

        let duration = start.elapsed();
        tracing::Span::current().record("events", events);
        tracing::Span::current().record("duration_ms", duration.as_millis());
        debug!(
            block = result.block_number,
            tokens = result.new_tokens.len(),
            pairs = result.new_pairs.len(),
            events,
            duration_ms = duration.as_millis(),
            "Block persisted"
        );
        Ok(())
    }

    // ==================== INDEXER STATE ====================

    /// Highest block persisted, if any.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn finished_block(&self) -> IndexerResult<Option<u64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT finished_block FROM indexer_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    IndexerError::database(
                        "Failed to query indexer state".to_string(),
                        Some(Box::new(e)),
                    )
                })?;

        Ok(row.and_then(|(block,)| u64::try_from(block).ok()))
    }

    /// Row counts and the watermark.
    ///
    /// # Errors
    ///
    /// Returns a database error if a query fails.
    pub async fn stats(&self) -> IndexerResult<IndexerStats> {
        let (token_count, pair_count, transaction_count): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM tokens),
                (SELECT COUNT(*) FROM pairs),
                (SELECT COUNT(*) FROM transactions)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to count rows".to_string(), Some(Box::new(e)))
        })?;

        Ok(IndexerStats {
            finished_block: self.finished_block().await?,
            token_count,
            pair_count,
            transaction_count,
        })
    }

    // ==================== QUERIES ====================

    /// Events stored for `block`, in log order.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn transactions_in_block(&self, block: u64) -> IndexerResult<Vec<TransactionRecord>> {
        sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions WHERE block_number = ? ORDER BY log_index",
        )
        .bind(to_i64(block, "block")?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database(
                "Failed to query transactions".to_string(),
                Some(Box::new(e)),
            )
        })
    }

    /// Stored pair by address.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn pair(&self, address: &str) -> IndexerResult<Option<PairRecord>> {
        sqlx::query_as::<_, PairRecord>("SELECT * FROM pairs WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database("Failed to query pair".to_string(), Some(Box::new(e)))
            })
    }

    /// Checks database connectivity.
    ///
    /// # Errors
    ///
    /// Returns a database error if the connection is unusable.
    pub async fn health_check(&self) -> IndexerResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database("Database health check failed".to_string(), Some(Box::new(e)))
            })?;
        info!("Database health check passed");
        Ok(())
    }
}

async fn upsert_token(tx: &mut Transaction<'_, Sqlite>, record: &TokenRecord) -> IndexerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tokens (
            address, name, symbol, decimals, total_supply, block_number, block_time, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (address) DO UPDATE SET
            name = excluded.name,
            symbol = excluded.symbol,
            decimals = excluded.decimals,
            total_supply = excluded.total_supply
        "#,
    )
    .bind(&record.address)
    .bind(&record.name)
    .bind(&record.symbol)
    .bind(record.decimals)
    .bind(&record.total_supply)
    .bind(record.block_number)
    .bind(record.block_time)
    .bind(record.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| IndexerError::database("Failed to upsert token".to_string(), Some(Box::new(e))))?;
    Ok(())
}

async fn upsert_pair(tx: &mut Transaction<'_, Sqlite>, record: &PairRecord) -> IndexerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO pairs (
            address, protocol_id, token0_address, token0_symbol, token0_decimals,
            token1_address, token1_symbol, token1_decimals, tokens_reversed, fee,
            block_number, block_time, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (address) DO UPDATE SET
            protocol_id = excluded.protocol_id,
            token0_symbol = excluded.token0_symbol,
            token1_symbol = excluded.token1_symbol,
            fee = excluded.fee,
            block_number = MAX(pairs.block_number, excluded.block_number),
            block_time = MAX(pairs.block_time, excluded.block_time)
        "#,
    )
    .bind(&record.address)
    .bind(record.protocol_id)
    .bind(&record.token0_address)
    .bind(&record.token0_symbol)
    .bind(record.token0_decimals)
    .bind(&record.token1_address)
    .bind(&record.token1_symbol)
    .bind(record.token1_decimals)
    .bind(record.tokens_reversed)
    .bind(record.fee)
    .bind(record.block_number)
    .bind(record.block_time)
    .bind(record.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| IndexerError::database("Failed to upsert pair".to_string(), Some(Box::new(e))))?;
    Ok(())
}

async fn upsert_transaction(
    tx: &mut Transaction<'_, Sqlite>,
    record: &TransactionRecord,
) -> IndexerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions (
            block_number, block_time, tx_hash, tx_index, log_index, maker, pair_address,
            protocol_id, kind, direction, amount0, amount1, native_price, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (tx_hash, log_index) DO UPDATE SET
            block_number = excluded.block_number,
            block_time = excluded.block_time,
            protocol_id = excluded.protocol_id,
            direction = excluded.direction,
            amount0 = excluded.amount0,
            amount1 = excluded.amount1,
            native_price = excluded.native_price
        "#,
    )
    .bind(record.block_number)
    .bind(record.block_time)
    .bind(&record.tx_hash)
    .bind(record.tx_index)
    .bind(record.log_index)
    .bind(&record.maker)
    .bind(&record.pair_address)
    .bind(record.protocol_id)
    .bind(&record.kind)
    .bind(&record.direction)
    .bind(&record.amount0)
    .bind(&record.amount1)
    .bind(record.native_price)
    .bind(record.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        IndexerError::database("Failed to upsert transaction".to_string(), Some(Box::new(e)))
    })?;
    Ok(())
}

async fn set_finished_block(tx: &mut Transaction<'_, Sqlite>, block: u64) -> IndexerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO indexer_state (id, finished_block, updated_at)
        VALUES (1, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            finished_block = MAX(indexer_state.finished_block, excluded.finished_block),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(to_i64(block, "block")?)
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        IndexerError::database("Failed to update indexer state".to_string(), Some(Box::new(e)))
    })?;
    Ok(())
}
