//! HTTP JSON-RPC access to the chain.
//!
//! Uses Alloy's `ProviderBuilder` over an HTTP transport and converts node
//! responses into the crate's block types.
//!
//! ## Example
//!
//! ```no_run
//! use dex_block_indexer::rpc::{ChainRpc, HttpChain};
//! use dex_block_indexer::error::IndexerResult;
//!
//! # async fn example() -> IndexerResult<()> {
//! let chain = HttpChain::connect("https://base-rpc.publicnode.com").await?;
//! let head = chain.block_number().await?;
//! println!("Head: {head}");
//! # Ok(())
//! # }
//! ```

use super::ChainRpc;
use crate::error::{IndexerError, IndexerResult};
use crate::types::{ChainBlock, ChainLog, ChainReceipt, ChainTransaction};
use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::network::TransactionResponse;
use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider as AlloyProvider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockTransactionsKind, TransactionInput, TransactionRequest};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::{debug, info, instrument, trace};

/// HTTP provider type.
pub type Provider = RootProvider<Http<Client>>;

/// Strip credentials (path API keys) from an endpoint before logging it.
pub(crate) fn redact_url(url: &str) -> &str {
    url.split("/v2/").next().unwrap_or("unknown")
}

/// Create an HTTP provider for `rpc_url`.
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed.
#[allow(clippy::unused_async)]
#[instrument(skip(rpc_url), fields(rpc_host = tracing::field::Empty))]
pub async fn create_provider(rpc_url: &str) -> IndexerResult<Provider> {
    let host = redact_url(rpc_url);
    tracing::Span::current().record("rpc_host", host);
    debug!(rpc_host = host, "Creating HTTP provider");

    let url = rpc_url.parse().map_err(|e| {
        IndexerError::config(
            format!("Failed to parse RPC_HTTP_URL: '{host}'"),
            Some(Box::new(e)),
        )
    })?;

    let provider = ProviderBuilder::new().on_http(url);
    info!(rpc_host = host, "HTTP provider initialized");
    Ok(provider)
}

/// [`ChainRpc`] over an HTTP provider.
#[derive(Clone)]
pub struct HttpChain {
    provider: Provider,
}

impl HttpChain {
    /// Wrap an existing provider.
    #[must_use]
    pub const fn new(provider: Provider) -> Self {
        Self { provider }
    }

    /// Build a provider for `rpc_url` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub async fn connect(rpc_url: &str) -> IndexerResult<Self> {
        Ok(Self::new(create_provider(rpc_url).await?))
    }
}

#[async_trait]
impl ChainRpc for HttpChain {
    #[instrument(skip(self), fields(block = tracing::field::Empty, duration_ms = tracing::field::Empty))]
    async fn block_number(&self) -> IndexerResult<u64> {
        let start = std::time::Instant::now();
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| IndexerError::rpc("Failed to fetch latest block number", Some(Box::new(e))))?;

        let span = tracing::Span::current();
        span.record("block", block_number);
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        trace!(block = block_number, "Head height fetched");
        Ok(block_number)
    }

    #[instrument(skip(self), fields(txs = tracing::field::Empty))]
    async fn block_by_number(&self, number: u64) -> IndexerResult<Option<ChainBlock>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number), BlockTransactionsKind::Full)
            .await
            .map_err(|e| {
                IndexerError::rpc(format!("Failed to fetch block {number}"), Some(Box::new(e)))
            })?;

        let Some(block) = block else {
            return Ok(None);
        };

        let transactions: Vec<ChainTransaction> = block
            .transactions
            .txns()
            .map(|tx| ChainTransaction {
                hash: tx.tx_hash(),
                from: tx.from(),
            })
            .collect();
        tracing::Span::current().record("txs", transactions.len());

        Ok(Some(ChainBlock {
            number: block.header.number,
            hash: block.header.hash,
            timestamp: block.header.timestamp,
            transactions,
        }))
    }

    #[instrument(skip(self), fields(receipts = tracing::field::Empty))]
    async fn block_receipts(&self, number: u64) -> IndexerResult<Vec<ChainReceipt>> {
        let receipts = self
            .provider
            .get_block_receipts(BlockId::number(number))
            .await
            .map_err(|e| {
                IndexerError::rpc(
                    format!("Failed to fetch receipts for block {number}"),
                    Some(Box::new(e)),
                )
            })?
            .ok_or_else(|| IndexerError::rpc(format!("Receipts for block {number} not found"), None))?;

        tracing::Span::current().record("receipts", receipts.len());

        Ok(receipts
            .into_iter()
            .enumerate()
            .map(|(position, receipt)| ChainReceipt {
                tx_hash: receipt.transaction_hash,
                tx_index: receipt.transaction_index.unwrap_or(position as u64),
                success: receipt.status(),
                logs: receipt
                    .inner
                    .logs()
                    .iter()
                    .enumerate()
                    .map(|(offset, log)| ChainLog {
                        address: log.address(),
                        topics: log.topics().to_vec(),
                        data: log.data().data.clone(),
                        log_index: log.log_index.unwrap_or(offset as u64),
                    })
                    .collect(),
            })
            .collect())
    }

    #[instrument(skip(self, data), fields(to = %to))]
    async fn call(&self, to: Address, data: Bytes, block: Option<u64>) -> IndexerResult<Bytes> {
        let request = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(data));

        let call = self.provider.call(&request);
        let call = match block {
            Some(number) => call.block(BlockId::number(number)),
            None => call,
        };

        call.await
            .map_err(|e| IndexerError::rpc(format!("eth_call to {to} failed"), Some(Box::new(e))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_hides_api_key() {
        assert_eq!(
            redact_url("https://base-mainnet.g.alchemy.com/v2/SECRET"),
            "https://base-mainnet.g.alchemy.com"
        );
        assert_eq!(redact_url("https://base-rpc.publicnode.com"), "https://base-rpc.publicnode.com");
    }

    #[tokio::test]
    async fn test_create_provider_invalid_url() {
        let result = create_provider("not a url").await;
        assert!(matches!(result, Err(IndexerError::ConfigError { .. })));
    }

    #[tokio::test]
    #[ignore = "Requires a reachable RPC_HTTP_URL"]
    async fn test_fetch_head_block_integration() {
        let rpc_url = std::env::var("RPC_HTTP_URL")
            .unwrap_or_else(|_| crate::config::DEFAULT_RPC_HTTP_URL.to_string());
        let chain = HttpChain::connect(&rpc_url).await.unwrap();

        let head = chain.block_number().await.unwrap();
        assert!(head > 0);

        let block = chain.block_by_number(head - 1).await.unwrap().unwrap();
        assert_eq!(block.number, head - 1);
        let receipts = chain.block_receipts(head - 1).await.unwrap();
        assert_eq!(receipts.len(), block.transactions.len());
    }
}
