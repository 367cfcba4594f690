//! Shared lookup cache for pairs, tokens, prices and the finished-block
//! watermark.
//!
//! The [`Cache`] trait is the seam; [`MemoryCache`] keeps everything in
//! process. On startup the pipeline seeds the watermark from SQLite so a
//! restart resumes where the last run committed.

use crate::error::IndexerResult;
use crate::types::{Pair, Token};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cache operations used by the pipeline.
///
/// Filtered pairs and tokens are cached like any other so they are never
/// resolved twice.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Cached pair at `address`.
    async fn get_pair(&self, address: Address) -> IndexerResult<Option<Pair>>;
    /// Store a pair.
    async fn set_pair(&self, pair: &Pair) -> IndexerResult<()>;
    /// Forget a pair.
    async fn del_pair(&self, address: Address) -> IndexerResult<()>;

    /// Cached token at `address`.
    async fn get_token(&self, address: Address) -> IndexerResult<Option<Token>>;
    /// Store a token.
    async fn set_token(&self, token: &Token) -> IndexerResult<()>;
    /// Forget a token.
    async fn del_token(&self, address: Address) -> IndexerResult<()>;

    /// Native token USD price at `block`.
    async fn get_price(&self, block: u64) -> IndexerResult<Option<f64>>;
    /// Store the native token price for `block`.
    async fn set_price(&self, block: u64, price: f64) -> IndexerResult<()>;

    /// Highest block whose result reached every sink.
    async fn get_finished_block(&self) -> IndexerResult<Option<u64>>;
    /// Advance the watermark. Prices at or below it are no longer needed
    /// and may be evicted.
    async fn set_finished_block(&self, block: u64) -> IndexerResult<()>;
}

/// In-process [`Cache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    pairs: RwLock<HashMap<Address, Pair>>,
    tokens: RwLock<HashMap<Address, Token>>,
    prices: RwLock<HashMap<u64, f64>>,
    finished_block: RwLock<Option<u64>>,
}

impl MemoryCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached pairs.
    pub async fn pair_count(&self) -> usize {
        self.pairs.read().await.len()
    }

    /// Number of cached tokens.
    pub async fn token_count(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Number of cached block prices.
    pub async fn price_count(&self) -> usize {
        self.prices.read().await.len()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_pair(&self, address: Address) -> IndexerResult<Option<Pair>> {
        Ok(self.pairs.read().await.get(&address).cloned())
    }

    async fn set_pair(&self, pair: &Pair) -> IndexerResult<()> {
        self.pairs.write().await.insert(pair.address, pair.clone());
        Ok(())
    }

    async fn del_pair(&self, address: Address) -> IndexerResult<()> {
        self.pairs.write().await.remove(&address);
        Ok(())
    }

    async fn get_token(&self, address: Address) -> IndexerResult<Option<Token>> {
        Ok(self.tokens.read().await.get(&address).cloned())
    }

    async fn set_token(&self, token: &Token) -> IndexerResult<()> {
        self.tokens.write().await.insert(token.address, token.clone());
        Ok(())
    }

    async fn del_token(&self, address: Address) -> IndexerResult<()> {
        self.tokens.write().await.remove(&address);
        Ok(())
    }

    async fn get_price(&self, block: u64) -> IndexerResult<Option<f64>> {
        Ok(self.prices.read().await.get(&block).copied())
    }

    async fn set_price(&self, block: u64, price: f64) -> IndexerResult<()> {
        self.prices.write().await.insert(block, price);
        Ok(())
    }

    async fn get_finished_block(&self) -> IndexerResult<Option<u64>> {
        Ok(*self.finished_block.read().await)
    }

    async fn set_finished_block(&self, block: u64) -> IndexerResult<()> {
        let watermark = {
            let mut finished = self.finished_block.write().await;
            let watermark = finished.map_or(block, |current| current.max(block));
            *finished = Some(watermark);
            watermark
        };
        self.prices.write().await.retain(|height, _| *height > watermark);
        Ok(())
    }
}
