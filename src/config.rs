//! Configuration management for the DEX block indexer.
//!
//! This module handles loading and validating configuration from environment variables
//! using the `dotenvy` crate. All operations return [`IndexerResult`] for comprehensive
//! error handling.
//!
//! ## Environment Variables
//!
//! All variables are optional:
//! - `RPC_HTTP_URL`: HTTP JSON-RPC endpoint (default: `https://base-rpc.publicnode.com`)
//! - `RPC_WS_URL`: WebSocket endpoint for new heads (default: `wss://base-rpc.publicnode.com`)
//! - `DATABASE_URL`: SQLite database (default: `sqlite:./indexer.db`)
//! - `START_BLOCK` / `END_BLOCK`: Explicit start and optional last height
//! - `FETCH_POOL_SIZE`, `FETCH_QUEUE_SIZE`: Block fetch workers and queue depth (default: 1, 1)
//! - `PARSE_POOL_SIZE`, `PARSE_QUEUE_SIZE`: Block parse workers and queue depth (default: 1, 1)
//! - `FETCH_RETRY_ATTEMPTS`, `FETCH_RETRY_DELAY_MS`, `FETCH_RETRY_TIMEOUT_MS` (default: 10, 100, 5000)
//! - `CALL_RETRY_ATTEMPTS`, `CALL_RETRY_DELAY_MS`, `CALL_RETRY_TIMEOUT_MS` (default: 10, 100, 3000)
//! - `ENABLE_SEQUENCER`: Restore strict height order (default: true)
//! - `HEAD_IDLE_TIMEOUT_SECS`: Resubscribe after this long without a header (default: 10)
//! - `RECONNECT_INITIAL_DELAY_SECS`, `RECONNECT_MAX_DELAY_SECS` (default: 1, 10)
//! - `PRICE_PREFETCH_WORKERS`: Background native price warmers, 0 disables (default: 0)
//! - `ENABLE_DB_SINK`: Persist block results to SQLite (default: true)
//! - `PUBLISH_FILE`: Append one JSON message per block to this file
//! - `PUBLISH_CHANNEL_CAPACITY`: In-process broadcast capacity (default: 1024)
//!
//! ## Example
//!
//! ```no_run
//! use dex_block_indexer::config::Config;
//! use dex_block_indexer::error::IndexerResult;
//!
//! # fn main() -> IndexerResult<()> {
//! let config = Config::from_env()?;
//! println!("RPC URL: {}", config.rpc_http_url());
//! # Ok(())
//! # }
//! ```

use crate::error::{IndexerError, IndexerResult};
use crate::rpc::retry::RetryPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default HTTP endpoint (Base mainnet).
pub const DEFAULT_RPC_HTTP_URL: &str = "https://base-rpc.publicnode.com";

/// Default WebSocket endpoint (Base mainnet).
pub const DEFAULT_RPC_WS_URL: &str = "wss://base-rpc.publicnode.com";

/// Default SQLite database location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:./indexer.db";

/// Main configuration struct for the indexer.
///
/// Contains all runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    rpc_http_url: String,
    rpc_ws_url: String,
    database_url: String,
    start_block: Option<u64>,
    end_block: Option<u64>,
    fetch_pool_size: usize,
    fetch_queue_size: usize,
    parse_pool_size: usize,
    parse_queue_size: usize,
    fetch_retry: RetryPolicy,
    call_retry: RetryPolicy,
    enable_sequencer: bool,
    head_idle_timeout: Duration,
    reconnect_initial_delay: Duration,
    reconnect_max_delay: Duration,
    price_prefetch_workers: usize,
    enable_db_sink: bool,
    publish_file: Option<PathBuf>,
    publish_channel_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This function:
    /// 1. Loads `.env` file using `dotenvy` (if present)
    /// 2. Reads and validates all environment variables
    /// 3. Applies defaults for optional variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds a value that cannot be parsed or
    /// fails validation (zero pool size, wrong URL scheme, ...).
    pub fn from_env() -> IndexerResult<Self> {
        // Load .env file if present (ignore error if file doesn't exist)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// [`Config::from_env`] calls this with the process environment; tests pass
    /// a map so they never race on shared environment variables.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> IndexerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let rpc_http_url = var("RPC_HTTP_URL").unwrap_or_else(|| DEFAULT_RPC_HTTP_URL.to_string());
        if !rpc_http_url.starts_with("http") {
            return Err(IndexerError::config(
                format!("RPC_HTTP_URL must be an http(s) URL, got: {rpc_http_url}"),
                None,
            ));
        }

        let rpc_ws_url = var("RPC_WS_URL").unwrap_or_else(|| DEFAULT_RPC_WS_URL.to_string());
        if !rpc_ws_url.starts_with("ws") {
            return Err(IndexerError::config(
                format!("RPC_WS_URL must be a ws(s) URL, got: {rpc_ws_url}"),
                None,
            ));
        }

        let database_url = var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        // A zero start block means "resolve from cache or chain head"
        let start_block = parse_optional::<u64>(&var, "START_BLOCK")?.filter(|b| *b > 0);
        let end_block = parse_optional::<u64>(&var, "END_BLOCK")?;
        if let (Some(start), Some(end)) = (start_block, end_block) {
            if end < start {
                return Err(IndexerError::config(
                    format!("END_BLOCK ({end}) must not be below START_BLOCK ({start})"),
                    None,
                ));
            }
        }

        let fetch_pool_size = parse_positive(&var, "FETCH_POOL_SIZE", 1)?;
        let fetch_queue_size = parse_positive(&var, "FETCH_QUEUE_SIZE", 1)?;
        let parse_pool_size = parse_positive(&var, "PARSE_POOL_SIZE", 1)?;
        let parse_queue_size = parse_positive(&var, "PARSE_QUEUE_SIZE", 1)?;

        let fetch_retry = RetryPolicy::new(
            parse_positive(&var, "FETCH_RETRY_ATTEMPTS", 10)?,
            Duration::from_millis(parse_or(&var, "FETCH_RETRY_DELAY_MS", 100)?),
            Duration::from_millis(parse_positive(&var, "FETCH_RETRY_TIMEOUT_MS", 5000)?),
        );
        let call_retry = RetryPolicy::new(
            parse_positive(&var, "CALL_RETRY_ATTEMPTS", 10)?,
            Duration::from_millis(parse_or(&var, "CALL_RETRY_DELAY_MS", 100)?),
            Duration::from_millis(parse_positive(&var, "CALL_RETRY_TIMEOUT_MS", 3000)?),
        );

        let enable_sequencer = parse_or(&var, "ENABLE_SEQUENCER", true)?;

        let head_idle_timeout =
            Duration::from_secs(parse_positive(&var, "HEAD_IDLE_TIMEOUT_SECS", 10)?);
        let reconnect_initial_delay =
            Duration::from_secs(parse_positive(&var, "RECONNECT_INITIAL_DELAY_SECS", 1)?);
        let reconnect_max_delay =
            Duration::from_secs(parse_positive(&var, "RECONNECT_MAX_DELAY_SECS", 10)?);
        if reconnect_max_delay < reconnect_initial_delay {
            return Err(IndexerError::config(
                "RECONNECT_MAX_DELAY_SECS must be >= RECONNECT_INITIAL_DELAY_SECS",
                None,
            ));
        }

        let price_prefetch_workers = parse_or(&var, "PRICE_PREFETCH_WORKERS", 0)?;
        let enable_db_sink = parse_or(&var, "ENABLE_DB_SINK", true)?;
        let publish_file = var("PUBLISH_FILE").map(PathBuf::from);
        let publish_channel_capacity = parse_positive(&var, "PUBLISH_CHANNEL_CAPACITY", 1024)?;

        Ok(Self {
            rpc_http_url,
            rpc_ws_url,
            database_url,
            start_block,
            end_block,
            fetch_pool_size,
            fetch_queue_size,
            parse_pool_size,
            parse_queue_size,
            fetch_retry,
            call_retry,
            enable_sequencer,
            head_idle_timeout,
            reconnect_initial_delay,
            reconnect_max_delay,
            price_prefetch_workers,
            enable_db_sink,
            publish_file,
            publish_channel_capacity,
        })
    }

    /// Override the start block (from the CLI). Zero clears it.
    #[must_use]
    pub fn with_start_block(mut self, start_block: Option<u64>) -> Self {
        if let Some(start) = start_block {
            self.start_block = Some(start).filter(|b| *b > 0);
        }
        self
    }

    /// Override the end block (from the CLI).
    #[must_use]
    pub fn with_end_block(mut self, end_block: Option<u64>) -> Self {
        if end_block.is_some() {
            self.end_block = end_block;
        }
        self
    }

    /// Override sequencing (from the CLI).
    #[must_use]
    pub const fn with_sequencer(mut self, enabled: bool) -> Self {
        self.enable_sequencer = enabled;
        self
    }

    /// Get the HTTP RPC URL.
    #[must_use]
    pub fn rpc_http_url(&self) -> &str {
        &self.rpc_http_url
    }

    /// Get the WebSocket RPC URL.
    #[must_use]
    pub fn rpc_ws_url(&self) -> &str {
        &self.rpc_ws_url
    }

    /// Get the database URL.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Explicitly configured start block, if any.
    #[must_use]
    pub const fn start_block(&self) -> Option<u64> {
        self.start_block
    }

    /// Last block to dispatch, if the run is bounded.
    #[must_use]
    pub const fn end_block(&self) -> Option<u64> {
        self.end_block
    }

    /// Number of concurrent block fetch tasks.
    #[must_use]
    pub const fn fetch_pool_size(&self) -> usize {
        self.fetch_pool_size
    }

    /// Depth of the block-number queue feeding the fetch pool.
    #[must_use]
    pub const fn fetch_queue_size(&self) -> usize {
        self.fetch_queue_size
    }

    /// Number of concurrent block parse tasks.
    #[must_use]
    pub const fn parse_pool_size(&self) -> usize {
        self.parse_pool_size
    }

    /// Depth of the queues around the parse pool.
    #[must_use]
    pub const fn parse_queue_size(&self) -> usize {
        self.parse_queue_size
    }

    /// Retry policy for block body and receipt fetches.
    #[must_use]
    pub const fn fetch_retry(&self) -> &RetryPolicy {
        &self.fetch_retry
    }

    /// Retry policy for read-only contract calls.
    #[must_use]
    pub const fn call_retry(&self) -> &RetryPolicy {
        &self.call_retry
    }

    /// Whether the sequencers enforce height order.
    #[must_use]
    pub const fn enable_sequencer(&self) -> bool {
        self.enable_sequencer
    }

    /// Idle timeout on the head subscription.
    #[must_use]
    pub const fn head_idle_timeout(&self) -> Duration {
        self.head_idle_timeout
    }

    /// First reconnect delay.
    #[must_use]
    pub const fn reconnect_initial_delay(&self) -> Duration {
        self.reconnect_initial_delay
    }

    /// Reconnect delay cap.
    #[must_use]
    pub const fn reconnect_max_delay(&self) -> Duration {
        self.reconnect_max_delay
    }

    /// Price prefetch concurrency (0 disables prefetching).
    #[must_use]
    pub const fn price_prefetch_workers(&self) -> usize {
        self.price_prefetch_workers
    }

    /// Whether block results are persisted to SQLite.
    #[must_use]
    pub const fn enable_db_sink(&self) -> bool {
        self.enable_db_sink
    }

    /// Optional JSON-lines publish target.
    #[must_use]
    pub const fn publish_file(&self) -> Option<&PathBuf> {
        self.publish_file.as_ref()
    }

    /// Capacity of the in-process block message broadcast.
    #[must_use]
    pub const fn publish_channel_capacity(&self) -> usize {
        self.publish_channel_capacity
    }
}

fn parse_optional<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> IndexerResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                IndexerError::config(
                    format!("{key} has an invalid value: {raw}"),
                    Some(Box::new(e)),
                )
            })
        })
        .transpose()
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> IndexerResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_optional(var, key)?.unwrap_or(default))
}

fn parse_positive<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> IndexerResult<T>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = parse_or(var, key, default)?;
    if value == T::default() {
        return Err(IndexerError::config(format!("{key} must be greater than zero"), None));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> IndexerResult<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.rpc_http_url(), DEFAULT_RPC_HTTP_URL);
        assert_eq!(config.rpc_ws_url(), DEFAULT_RPC_WS_URL);
        assert_eq!(config.database_url(), DEFAULT_DATABASE_URL);
        assert_eq!(config.start_block(), None);
        assert_eq!(config.fetch_pool_size(), 1);
        assert_eq!(config.parse_queue_size(), 1);
        assert_eq!(config.fetch_retry().attempts(), 10);
        assert_eq!(config.fetch_retry().timeout(), Duration::from_millis(5000));
        assert_eq!(config.call_retry().timeout(), Duration::from_millis(3000));
        assert!(config.enable_sequencer());
        assert_eq!(config.head_idle_timeout(), Duration::from_secs(10));
        assert_eq!(config.price_prefetch_workers(), 0);
        assert!(config.publish_file().is_none());
    }

    #[test]
    fn test_config_overrides() {
        let config = config_from(&[
            ("FETCH_POOL_SIZE", "8"),
            ("FETCH_QUEUE_SIZE", "32"),
            ("START_BLOCK", "48000000"),
            ("END_BLOCK", "48000010"),
            ("ENABLE_SEQUENCER", "false"),
            ("PUBLISH_FILE", "./blocks.jsonl"),
        ])
        .unwrap();

        assert_eq!(config.fetch_pool_size(), 8);
        assert_eq!(config.fetch_queue_size(), 32);
        assert_eq!(config.start_block(), Some(48_000_000));
        assert_eq!(config.end_block(), Some(48_000_010));
        assert!(!config.enable_sequencer());
        assert_eq!(config.publish_file(), Some(&PathBuf::from("./blocks.jsonl")));
    }

    #[test]
    fn test_config_zero_start_block_means_resolve() {
        let config = config_from(&[("START_BLOCK", "0")]).unwrap();
        assert_eq!(config.start_block(), None);
    }

    #[test]
    fn test_config_rejects_zero_pool() {
        assert!(config_from(&[("PARSE_POOL_SIZE", "0")]).is_err());
    }

    #[test]
    fn test_config_rejects_garbage_numbers() {
        let err = config_from(&[("FETCH_RETRY_ATTEMPTS", "ten")]).unwrap_err();
        assert!(err.to_string().contains("FETCH_RETRY_ATTEMPTS"));
    }

    #[test]
    fn test_config_rejects_wrong_url_scheme() {
        assert!(config_from(&[("RPC_WS_URL", "https://base-rpc.publicnode.com")]).is_err());
        assert!(config_from(&[("RPC_HTTP_URL", "ftp://node")]).is_err());
    }

    #[test]
    fn test_config_rejects_inverted_range() {
        assert!(config_from(&[("START_BLOCK", "100"), ("END_BLOCK", "99")]).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let config = config_from(&[("START_BLOCK", "5")])
            .unwrap()
            .with_start_block(Some(10))
            .with_end_block(Some(12))
            .with_sequencer(false);

        assert_eq!(config.start_block(), Some(10));
        assert_eq!(config.end_block(), Some(12));
        assert!(!config.enable_sequencer());
    }
}
