//! Downstream delivery of block results.
//!
//! Every committed block is rendered once into a [`BlockMessage`] and handed
//! to each [`ResultSink`] in turn. Sinks must be idempotent per block: after a
//! restart the last finished block is delivered again.
//!
//! - [`BroadcastPublisher`]: in-process `tokio::sync::broadcast` bus
//! - [`FilePublisher`]: one JSON document per line, appended to a file
//! - [`crate::db::DbSink`]: SQLite persistence

use crate::error::{IndexerError, IndexerResult};
use crate::types::{BlockResult, Event, Pair, Token, TxResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, instrument};

/// A consumer of finished blocks.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver one block.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the pipeline.
    async fn publish(&self, result: &BlockResult, message: &Arc<BlockMessage>) -> IndexerResult<()>;
}

/// Wire rendering of a [`BlockResult`]. Addresses and hashes are hex strings,
/// integer amounts decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMessage {
    /// Block height
    pub block_number: u64,
    /// Block timestamp (seconds)
    pub block_time: u64,
    /// Block timestamp (ISO 8601)
    pub timestamp: DateTime<Utc>,
    /// Native token USD price
    pub native_price: f64,
    /// Transactions with events
    pub txs: Vec<TxMessage>,
    /// Pairs discovered in this block
    pub new_pairs: Vec<PairMessage>,
    /// Tokens discovered in this block
    pub new_tokens: Vec<TokenMessage>,
}

/// One transaction in a [`BlockMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMessage {
    /// Transaction hash
    pub tx_hash: String,
    /// Index in the block
    pub tx_index: u64,
    /// Sender
    pub maker: String,
    /// Events in log order
    pub events: Vec<EventMessage>,
}

/// One event in a [`TxMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    /// `pair_created`, `mint`, `burn`, `swap` or `sync`
    pub kind: String,
    /// Log index in the block
    pub log_index: u64,
    /// Pair address
    pub pair: String,
    /// Owning protocol name
    pub protocol: String,
    /// Display token0 address
    pub token0: String,
    /// Display token1 address
    pub token1: String,
    /// Display token0 amount (raw)
    pub amount0: String,
    /// Display token1 amount (raw)
    pub amount1: String,
    /// `buy` or `sell` for swaps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

/// A newly discovered pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairMessage {
    /// Pair address
    pub address: String,
    /// Owning protocol name
    pub protocol: String,
    /// Display token0 address
    pub token0: String,
    /// Display token1 address
    pub token1: String,
    /// On-chain order differs from display order
    pub tokens_reversed: bool,
    /// Fee tier (V3 pools)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u32>,
    /// Creation block (0 when discovered later)
    pub block_number: u64,
}

/// A newly discovered token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMessage {
    /// Token address
    pub address: String,
    /// Name
    pub name: String,
    /// Symbol
    pub symbol: String,
    /// Decimals
    pub decimals: u8,
    /// Raw total supply
    pub total_supply: String,
    /// Block the token was first seen in
    pub block_number: u64,
}

impl From<&BlockResult> for BlockMessage {
    fn from(result: &BlockResult) -> Self {
        let timestamp = i64::try_from(result.block_time)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default();

        Self {
            block_number: result.block_number,
            block_time: result.block_time,
            timestamp,
            native_price: result.native_price,
            txs: result.txs.iter().map(TxMessage::from).collect(),
            new_pairs: result.new_pairs.values().map(PairMessage::from).collect(),
            new_tokens: result.new_tokens.values().map(TokenMessage::from).collect(),
        }
    }
}

impl From<&TxResult> for TxMessage {
    fn from(tx: &TxResult) -> Self {
        Self {
            tx_hash: tx.tx_hash.to_string(),
            tx_index: tx.tx_index,
            maker: tx.maker.to_string(),
            events: tx.events.iter().map(EventMessage::from).collect(),
        }
    }
}

impl From<&Event> for EventMessage {
    fn from(event: &Event) -> Self {
        let (amount0, amount1) = event.display_amounts();
        let (token0, token1) = event.pair.as_ref().map_or_else(
            || (String::new(), String::new()),
            |pair| (pair.token0.address.to_string(), pair.token1.address.to_string()),
        );

        Self {
            kind: event.kind.name().to_string(),
            log_index: event.meta.log_index,
            pair: event.pair_address().to_string(),
            protocol: event.protocol_id().map_or("Unknown", |p| p.name()).to_string(),
            token0,
            token1,
            amount0: amount0.to_string(),
            amount1: amount1.to_string(),
            direction: event.swap_trade().map(|t| t.direction.to_string()),
        }
    }
}

impl From<&Pair> for PairMessage {
    fn from(pair: &Pair) -> Self {
        Self {
            address: pair.address.to_string(),
            protocol: pair.protocol_id().map_or("Unknown", |p| p.name()).to_string(),
            token0: pair.token0.address.to_string(),
            token1: pair.token1.address.to_string(),
            tokens_reversed: pair.tokens_reversed,
            fee: pair.fee,
            block_number: pair.block_number,
        }
    }
}

impl From<&Token> for TokenMessage {
    fn from(token: &Token) -> Self {
        Self {
            address: token.address.to_string(),
            name: token.name.clone(),
            symbol: token.symbol.clone(),
            decimals: token.decimals,
            total_supply: token.total_supply.to_string(),
            block_number: token.block_number,
        }
    }
}

/// In-process message bus.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Arc<BlockMessage>>,
}

impl BroadcastPublisher {
    /// Bus holding at most `capacity` undelivered messages per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New receiver seeing every message published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BlockMessage>> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl ResultSink for BroadcastPublisher {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn publish(&self, result: &BlockResult, message: &Arc<BlockMessage>) -> IndexerResult<()> {
        // No receiver is not an error: the bus is optional downstream.
        let delivered = self.sender.send(Arc::clone(message)).unwrap_or(0);
        debug!(block = result.block_number, delivered, "Block message broadcast");
        Ok(())
    }
}

/// Appends one JSON line per block to a file.
#[derive(Debug)]
pub struct FilePublisher {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FilePublisher {
    /// Open `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a sink error when the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> IndexerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                IndexerError::sink(
                    format!("Failed to open publish file {}", path.display()),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for FilePublisher {
    fn name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip_all, fields(block = result.block_number))]
    async fn publish(&self, result: &BlockResult, message: &Arc<BlockMessage>) -> IndexerResult<()> {
        let mut line = serde_json::to_vec(message.as_ref()).map_err(|e| {
            IndexerError::sink("Failed to serialize block message", Some(Box::new(e)))
        })?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await.map_err(|e| {
            IndexerError::sink(
                format!("Failed to append to {}", self.path.display()),
                Some(Box::new(e)),
            )
        })?;
        file.flush().await.map_err(|e| {
            IndexerError::sink(
                format!("Failed to flush {}", self.path.display()),
                Some(Box::new(e)),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, LogMeta, ProtocolId, SwapAmounts, WETH_ADDRESS};
    use alloy::primitives::{address, Address, B256, U256};

    fn sample() -> BlockResult {
        let pair_address = address!("00000000000000000000000000000000000000bb");
        let meme = address!("000000000000000000000000000000000000c0de");

        let mut pair = Pair::new(pair_address, WETH_ADDRESS, meme);
        pair.set_protocol(ProtocolId::UniswapV2);
        pair.order_tokens();

        let mut swap = Event::new(
            EventKind::Swap(SwapAmounts::V2 {
                amount0_in: U256::ZERO,
                amount1_in: U256::from(100),
                amount0_out: U256::from(7),
                amount1_out: U256::ZERO,
            }),
            pair_address,
            vec![ProtocolId::UniswapV2, ProtocolId::PancakeV2],
            LogMeta {
                log_index: 4,
                ..LogMeta::default()
            },
        );
        swap.set_pair(pair.clone());

        let mut tx = TxResult::new(B256::repeat_byte(9), 0, Address::repeat_byte(1));
        tx.add_event(swap);

        let mut result = BlockResult::new(100, 1_700_000_000, 3000.5);
        result.add_tx_result(tx);
        result.add_new_pair(&pair);
        result
    }

    #[test]
    fn test_message_uses_display_order_and_strings() {
        let message = BlockMessage::from(&sample());
        assert_eq!(message.block_number, 100);
        assert_eq!(message.timestamp.timestamp(), 1_700_000_000);

        let event = &message.txs[0].events[0];
        assert_eq!(event.kind, "swap");
        assert_eq!(event.protocol, "UniswapV2");
        assert_eq!(event.token1, WETH_ADDRESS.to_string());
        // Reversed pair: 100 MEME sold for 7 WETH.
        assert_eq!(event.direction.as_deref(), Some("sell"));
        assert_eq!((event.amount0.as_str(), event.amount1.as_str()), ("100", "7"));

        assert_eq!(message.new_pairs.len(), 1);
        assert!(message.new_pairs[0].tokens_reversed);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new(4);
        let result = sample();
        let message = Arc::new(BlockMessage::from(&result));
        publisher.publish(&result, &message).await.unwrap();

        let mut rx = publisher.subscribe();
        publisher.publish(&result, &message).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().block_number, 100);
    }

    #[tokio::test]
    async fn test_file_publisher_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.jsonl");
        let publisher = FilePublisher::open(&path).await.unwrap();

        let result = sample();
        let message = Arc::new(BlockMessage::from(&result));
        publisher.publish(&result, &message).await.unwrap();
        publisher.publish(&result, &message).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: BlockMessage = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, *message);
    }
}
