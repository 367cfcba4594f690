//! Typed read-only contract calls.
//!
//! Every call is ABI-encoded from a `sol!` call type, sent through
//! [`ChainRpc::call`] under the call retry policy, and decoded back into the
//! call's return type. Reverts and undecodable returns are not retried.

use super::retry::RetryPolicy;
use super::ChainRpc;
use crate::abi::{IAerodromeFactory, IUniswapV2Factory, IUniswapV2Pair, IUniswapV3Factory, IUniswapV3Pool, IERC20};
use crate::error::{is_retryable_error, IndexerError, IndexerResult};
use alloy::primitives::aliases::U24;
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;
use tracing::{instrument, trace};

/// Issues typed calls against contracts.
#[derive(Clone)]
pub struct ContractCaller {
    chain: Arc<dyn ChainRpc>,
    retry: RetryPolicy,
}

impl ContractCaller {
    /// Caller over `chain` retrying with `retry`.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainRpc>, retry: RetryPolicy) -> Self {
        Self { chain, retry }
    }

    /// Call `to` with `call` at `block` (latest when `None`).
    ///
    /// # Errors
    ///
    /// Returns an RPC error once retries are exhausted, or a decoding error
    /// if the return data does not match the call's ABI.
    pub async fn call<C: SolCall>(
        &self,
        to: Address,
        call: &C,
        block: Option<u64>,
    ) -> IndexerResult<C::Return> {
        let data = Bytes::from(call.abi_encode());
        let chain = self.chain.as_ref();

        let output = self
            .retry
            .run_if(
                C::SIGNATURE,
                || {
                    let data = data.clone();
                    async move { chain.call(to, data, block).await }
                },
                is_retryable_error,
            )
            .await?;

        trace!(to = %to, function = C::SIGNATURE, bytes = output.len(), "Call returned");
        C::abi_decode_returns(&output, true).map_err(|e| {
            IndexerError::decoding(
                format!("{} on {to} returned undecodable data", C::SIGNATURE),
                Some(Box::new(e)),
            )
        })
    }

    /// `pair.token0()`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn token0(&self, pair: Address) -> IndexerResult<Address> {
        Ok(self.call(pair, &IUniswapV2Pair::token0Call {}, None).await?._0)
    }

    /// `pair.token1()`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn token1(&self, pair: Address) -> IndexerResult<Address> {
        Ok(self.call(pair, &IUniswapV2Pair::token1Call {}, None).await?._0)
    }

    /// `factory.getPair(token0, token1)`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn get_pair(
        &self,
        factory: Address,
        token0: Address,
        token1: Address,
    ) -> IndexerResult<Address> {
        let call = IUniswapV2Factory::getPairCall {
            tokenA: token0,
            tokenB: token1,
        };
        Ok(self.call(factory, &call, None).await?.pair)
    }

    /// `pool.fee()`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn pool_fee(&self, pool: Address) -> IndexerResult<u32> {
        let fee = self.call(pool, &IUniswapV3Pool::feeCall {}, None).await?._0;
        Ok(fee.to::<u32>())
    }

    /// `factory.getPool(token0, token1, fee)`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn get_pool(
        &self,
        factory: Address,
        token0: Address,
        token1: Address,
        fee: u32,
    ) -> IndexerResult<Address> {
        let call = IUniswapV3Factory::getPoolCall {
            tokenA: token0,
            tokenB: token1,
            fee: U24::saturating_from(fee),
        };
        Ok(self.call(factory, &call, None).await?.pool)
    }

    /// `factory.isPool(pool)`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn is_pool(&self, factory: Address, pool: Address) -> IndexerResult<bool> {
        let call = IAerodromeFactory::isPoolCall { pool };
        Ok(self.call(factory, &call, None).await?._0)
    }

    /// ERC-20 `name()`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn name(&self, token: Address) -> IndexerResult<String> {
        Ok(self.call(token, &IERC20::nameCall {}, None).await?._0)
    }

    /// ERC-20 `symbol()`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn symbol(&self, token: Address) -> IndexerResult<String> {
        Ok(self.call(token, &IERC20::symbolCall {}, None).await?._0)
    }

    /// ERC-20 `decimals()`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn decimals(&self, token: Address) -> IndexerResult<u8> {
        Ok(self.call(token, &IERC20::decimalsCall {}, None).await?._0)
    }

    /// ERC-20 `totalSupply()`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    pub async fn total_supply(&self, token: Address) -> IndexerResult<U256> {
        Ok(self.call(token, &IERC20::totalSupplyCall {}, None).await?._0)
    }

    /// `pair.getReserves()` as of `block`.
    ///
    /// # Errors
    ///
    /// See [`ContractCaller::call`].
    #[instrument(skip(self), fields(pair = %pair))]
    pub async fn get_reserves(&self, pair: Address, block: u64) -> IndexerResult<(U256, U256)> {
        let reserves = self
            .call(pair, &IUniswapV2Pair::getReservesCall {}, Some(block))
            .await?;
        Ok((U256::from(reserves.reserve0), U256::from(reserves.reserve1)))
    }
}
