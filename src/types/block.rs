//! Fetched block data and the per-block processing context.

use super::result::BlockResult;
use crate::error::{IndexerError, IndexerResult};
use crate::sequencer::Sequenced;
use alloy::primitives::{Address, Bytes, B256};
use std::collections::HashMap;

/// A transaction as returned with a full block body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainTransaction {
    /// Transaction hash
    pub hash: B256,
    /// Sender as recovered by the node
    pub from: Address,
}

/// The block body fields the pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainBlock {
    /// Height
    pub number: u64,
    /// Block hash
    pub hash: B256,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    /// Transactions in index order
    pub transactions: Vec<ChainTransaction>,
}

/// A receipt log.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainLog {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics, topic0 first
    pub topics: Vec<B256>,
    /// Non-indexed payload
    pub data: Bytes,
    /// Index within the block
    pub log_index: u64,
}

/// A transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainReceipt {
    /// Transaction hash
    pub tx_hash: B256,
    /// Transaction index within the block
    pub tx_index: u64,
    /// Execution succeeded
    pub success: bool,
    /// Emitted logs
    pub logs: Vec<ChainLog>,
}

/// One block travelling through the pipeline.
///
/// Exactly one stage owns a context at a time; it moves between stages
/// through queues, so the sender cache needs no synchronization.
#[derive(Debug, Clone, Default)]
pub struct BlockContext {
    /// Block body
    pub block: ChainBlock,
    /// Receipts in transaction order
    pub receipts: Vec<ChainReceipt>,
    /// Native token price used for this block, once known
    pub native_price: Option<f64>,
    /// Parse output, once the parser has run
    pub result: Option<BlockResult>,
    senders: HashMap<u64, Address>,
}

impl BlockContext {
    /// Wrap a freshly fetched block.
    #[must_use]
    pub fn new(block: ChainBlock, receipts: Vec<ChainReceipt>) -> Self {
        Self {
            block,
            receipts,
            native_price: None,
            result: None,
            senders: HashMap::new(),
        }
    }

    /// Block height.
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.block.number
    }

    /// Block timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.block.timestamp
    }

    /// Sender of the transaction at `tx_index`, memoized for the lifetime of
    /// the context.
    ///
    /// # Errors
    ///
    /// Returns a state error when the index is outside the block body.
    pub fn tx_sender(&mut self, tx_index: u64) -> IndexerResult<Address> {
        if let Some(sender) = self.senders.get(&tx_index) {
            return Ok(*sender);
        }

        let sender = usize::try_from(tx_index)
            .ok()
            .and_then(|index| self.block.transactions.get(index))
            .map(|tx| tx.from)
            .ok_or_else(|| {
                IndexerError::state(
                    format!(
                        "tx index {tx_index} out of range ({} transactions) in block {}",
                        self.block.transactions.len(),
                        self.block.number
                    ),
                    None,
                )
            })?;

        self.senders.insert(tx_index, sender);
        Ok(sender)
    }

    /// Number of senders resolved so far.
    #[must_use]
    pub fn cached_senders(&self) -> usize {
        self.senders.len()
    }
}

impl Sequenced for BlockContext {
    fn sequence(&self) -> u64 {
        self.block.number
    }
}
