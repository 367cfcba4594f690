//! Chain access for the indexer.
//!
//! The pipeline talks to the chain through two seams:
//!
//! - [`ChainRpc`]: request/response reads (head height, block bodies,
//!   receipts, read-only contract calls). Implemented over HTTP by
//!   [`http::HttpChain`].
//! - [`HeadSubscriber`]: a push stream of new head heights. Implemented over a
//!   WebSocket by [`websocket::WsHeadSubscriber`].
//!
//! ```text
//!  HeadSubscriber ──▶ head tracker ──▶ dispatch ──▶ fetch pool ──┐
//!                                                                │ ChainRpc
//!  ContractCaller ───────────────────────────────────────────────┘
//! ```
//!
//! Both traits use crate-owned block types so in-memory chains can stand in
//! for a node in tests. Typed contract calls live in [`contract`], retry
//! budgets in [`retry`].

pub mod contract;
pub mod http;
pub mod retry;
pub mod websocket;

use crate::error::IndexerResult;
use crate::types::{ChainBlock, ChainReceipt};
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use contract::ContractCaller;
pub use http::{create_provider, HttpChain, Provider};
pub use retry::RetryPolicy;
pub use websocket::WsHeadSubscriber;

/// Stream of observed head heights. Ends or yields an error on disconnect.
pub type HeadStream = BoxStream<'static, IndexerResult<u64>>;

/// Request/response chain reads.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current head height.
    async fn block_number(&self) -> IndexerResult<u64>;

    /// Block body with full transactions, `None` if the node does not have it
    /// yet.
    async fn block_by_number(&self, number: u64) -> IndexerResult<Option<ChainBlock>>;

    /// All receipts of a block in transaction order.
    async fn block_receipts(&self, number: u64) -> IndexerResult<Vec<ChainReceipt>>;

    /// Read-only call of `to` with ABI-encoded `data`, at `block` or latest.
    async fn call(&self, to: Address, data: Bytes, block: Option<u64>) -> IndexerResult<Bytes>;
}

/// Source of new head notifications.
#[async_trait]
pub trait HeadSubscriber: Send + Sync {
    /// Open a fresh subscription.
    async fn subscribe(&self) -> IndexerResult<HeadStream>;
}
