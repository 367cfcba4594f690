//! Native token (ETH) USD price from the Uniswap V2 WETH/USDC pair.
//!
//! # Price Calculation
//!
//! ```text
//! price = (usdc_reserve / 10^6) / (weth_reserve / 10^18)
//!       = (usdc_reserve * 10^12) / weth_reserve
//! ```
//!
//! The quotient is computed in integer micro-dollars before converting to
//! `f64`, which keeps cents exact for any realistic reserve size.
//!
//! # Example
//!
//! ```
//! use alloy::primitives::U256;
//! use dex_block_indexer::pricing::calculate_native_price;
//!
//! // 1000 WETH against 2,000,000 USDC
//! let weth_reserve = U256::from(1000u128 * 10u128.pow(18));
//! let usdc_reserve = U256::from(2_000_000u128 * 10u128.pow(6));
//!
//! let price = calculate_native_price(weth_reserve, usdc_reserve).unwrap();
//! assert!((price - 2000.0).abs() < 0.01);
//! ```

use crate::block_getter::HeadTracker;
use crate::cache::Cache;
use crate::error::{IndexerError, IndexerResult};
use crate::rpc::ContractCaller;
use crate::types::WETH_USDC_PAIR;
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// `10^(WETH_DECIMALS - USDC_DECIMALS)`.
const DECIMAL_ADJUSTMENT: u128 = 1_000_000_000_000;

/// Fractional digits kept before the float conversion.
const PRICE_SCALE: u128 = 1_000_000;

/// Calculate the USD price of one WETH from pair reserves.
///
/// # Errors
///
/// Returns a math error if either reserve is zero, on overflow, or if the
/// price does not fit the float conversion.
pub fn calculate_native_price(weth_reserve: U256, usdc_reserve: U256) -> IndexerResult<f64> {
    if weth_reserve.is_zero() {
        return Err(IndexerError::math(
            "WETH reserve is zero, cannot calculate price",
            None,
        ));
    }
    if usdc_reserve.is_zero() {
        return Err(IndexerError::math(
            "USDC reserve is zero, cannot calculate price",
            None,
        ));
    }

    let numerator = usdc_reserve
        .checked_mul(U256::from(DECIMAL_ADJUSTMENT * PRICE_SCALE))
        .ok_or_else(|| IndexerError::math("Overflow when adjusting USDC reserve for decimals", None))?;

    let scaled = numerator
        .checked_div(weth_reserve)
        .ok_or_else(|| IndexerError::math("Division error calculating price", None))?;

    let scaled = u128::try_from(scaled).map_err(|e| {
        IndexerError::math("Price value too large to convert to f64", Some(Box::new(e)))
    })?;

    #[allow(clippy::cast_precision_loss)]
    let price = scaled as f64 / PRICE_SCALE as f64;

    Ok(price)
}

/// Per-block native token price, cached.
pub struct PriceService {
    cache: Arc<dyn Cache>,
    caller: ContractCaller,
    pair: Address,
}

impl PriceService {
    /// Service pricing from the Base WETH/USDC pair.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, caller: ContractCaller) -> Self {
        Self::with_pair(cache, caller, WETH_USDC_PAIR)
    }

    /// Service pricing from a custom WETH/USDC pair (token0 WETH).
    #[must_use]
    pub fn with_pair(cache: Arc<dyn Cache>, caller: ContractCaller, pair: Address) -> Self {
        Self { cache, caller, pair }
    }

    /// Native token price as of `block`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reserves cannot be read or are unusable.
    #[instrument(skip(self), fields(price = tracing::field::Empty))]
    pub async fn native_token_price(&self, block: u64) -> IndexerResult<f64> {
        if let Some(price) = self.cache.get_price(block).await? {
            return Ok(price);
        }

        let (weth_reserve, usdc_reserve) = self.caller.get_reserves(self.pair, block).await?;
        let price = calculate_native_price(weth_reserve, usdc_reserve)?;
        tracing::Span::current().record("price", price);

        self.cache.set_price(block, price).await?;
        debug!(block, price, "Native price cached");
        Ok(price)
    }

    /// Warm the price cache from `start` up to the tracked head with
    /// `workers` concurrent lookups, until `shutdown` fires.
    pub fn spawn_prefetch(
        self: &Arc<Self>,
        start: u64,
        workers: usize,
        head: Arc<HeadTracker>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            info!(start, workers, "Price prefetch started");
            let permits = Arc::new(Semaphore::new(workers.max(1)));
            let mut next = start;

            while !shutdown.is_cancelled() {
                if next > head.head() {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(Duration::from_secs(1)) => continue,
                    }
                }

                let permit = tokio::select! {
                    () = shutdown.cancelled() => break,
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let service = Arc::clone(&service);
                let block = next;
                tokio::spawn(async move {
                    if let Err(e) = service.native_token_price(block).await {
                        warn!(block, error = %e, "Price prefetch failed");
                    }
                    drop(permit);
                });
                next += 1;
            }
            info!(next, "Price prefetch stopped");
        })
    }
}
