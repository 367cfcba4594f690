//! Scripted in-memory chain shared by the integration tests.
//!
//! [`MockChain`] answers ABI-encoded calls from a table keyed by
//! `(contract, calldata)`, serves blocks and receipts with optional
//! per-height latency, and counts every call it sees. Unknown calls revert.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use alloy::primitives::aliases::{U112, U24};
use alloy::primitives::{Address, Bytes, LogData, B256, U256};
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use dex_block_indexer::abi::{
    IAerodromeFactory, IUniswapV2Factory, IUniswapV2Pair, IUniswapV3Factory, IUniswapV3Pool, IERC20,
};
use dex_block_indexer::error::{IndexerError, IndexerResult};
use dex_block_indexer::rpc::{ChainRpc, HeadStream, HeadSubscriber, RetryPolicy};
use dex_block_indexer::types::{
    ChainBlock, ChainLog, ChainReceipt, ChainTransaction, USDC_ADDRESS, WETH_ADDRESS,
    WETH_USDC_PAIR,
};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fast retry budget so reverts and missing blocks fail quickly.
pub const TEST_RETRY: RetryPolicy =
    RetryPolicy::new(2, Duration::from_millis(5), Duration::from_millis(500));

/// Block timestamp used by [`MockChain::add_block`]: genesis offset + height.
pub const fn block_time(number: u64) -> u64 {
    1_700_000_000 + number
}

/// In-memory chain implementing both chain seams.
#[derive(Default)]
pub struct MockChain {
    head: AtomicU64,
    responses: Mutex<HashMap<(Address, Bytes), Bytes>>,
    blocks: Mutex<HashMap<u64, (ChainBlock, Vec<ChainReceipt>)>>,
    latency: Mutex<HashMap<u64, Duration>>,
    call_delay: Mutex<Duration>,
    calls: Mutex<Vec<(Address, [u8; 4])>>,
    fetches: Mutex<Vec<u64>>,
}

impl MockChain {
    /// Chain with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain whose WETH/USDC pair prices ETH at 2000 USDC at every height.
    pub fn with_price() -> Self {
        let chain = Self::new();
        chain.set_reserves(
            WETH_USDC_PAIR,
            U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u64)),
            U256::from(2_000_000u64) * U256::from(10u64).pow(U256::from(6u64)),
        );
        chain
    }

    /// Script `to.call(call)` to return `returns` (already ABI-encoded).
    pub fn respond<C: SolCall>(&self, to: Address, call: &C, returns: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .insert((to, Bytes::from(call.abi_encode())), Bytes::from(returns));
    }

    /// `getReserves()` on `pair` at any height.
    pub fn set_reserves(&self, pair: Address, reserve0: U256, reserve1: U256) {
        self.respond(
            pair,
            &IUniswapV2Pair::getReservesCall {},
            IUniswapV2Pair::getReservesCall::abi_encode_returns(&(
                U112::from(reserve0),
                U112::from(reserve1),
                0u32,
            )),
        );
    }

    /// `token0()` / `token1()` on `pair`.
    pub fn set_pair_tokens(&self, pair: Address, token0: Address, token1: Address) {
        self.respond(
            pair,
            &IUniswapV2Pair::token0Call {},
            IUniswapV2Pair::token0Call::abi_encode_returns(&(token0,)),
        );
        self.respond(
            pair,
            &IUniswapV2Pair::token1Call {},
            IUniswapV2Pair::token1Call::abi_encode_returns(&(token1,)),
        );
    }

    /// `factory.getPair(token0, token1)` answers `pair`.
    pub fn set_v2_factory_pair(&self, factory: Address, token0: Address, token1: Address, pair: Address) {
        self.respond(
            factory,
            &IUniswapV2Factory::getPairCall {
                tokenA: token0,
                tokenB: token1,
            },
            IUniswapV2Factory::getPairCall::abi_encode_returns(&(pair,)),
        );
    }

    /// `pool.fee()` answers `fee` and `factory.getPool(token0, token1, fee)`
    /// answers `pool`.
    pub fn set_v3_factory_pool(
        &self,
        factory: Address,
        token0: Address,
        token1: Address,
        fee: u32,
        pool: Address,
    ) {
        let fee = U24::from(fee);
        self.respond(
            pool,
            &IUniswapV3Pool::feeCall {},
            IUniswapV3Pool::feeCall::abi_encode_returns(&(fee,)),
        );
        self.respond(
            factory,
            &IUniswapV3Factory::getPoolCall {
                tokenA: token0,
                tokenB: token1,
                fee,
            },
            IUniswapV3Factory::getPoolCall::abi_encode_returns(&(pool,)),
        );
    }

    /// `factory.isPool(pool)` answers `is_pool`.
    pub fn set_aerodrome_pool(&self, factory: Address, pool: Address, is_pool: bool) {
        self.respond(
            factory,
            &IAerodromeFactory::isPoolCall { pool },
            IAerodromeFactory::isPoolCall::abi_encode_returns(&(is_pool,)),
        );
    }

    /// ERC-20 metadata of `token`. `decimals: None` makes `decimals()` revert.
    pub fn set_token(&self, token: Address, symbol: &str, decimals: Option<u8>) {
        self.respond(
            token,
            &IERC20::nameCall {},
            IERC20::nameCall::abi_encode_returns(&(format!("{symbol} Token"),)),
        );
        self.respond(
            token,
            &IERC20::symbolCall {},
            IERC20::symbolCall::abi_encode_returns(&(symbol.to_string(),)),
        );
        if let Some(decimals) = decimals {
            self.respond(
                token,
                &IERC20::decimalsCall {},
                IERC20::decimalsCall::abi_encode_returns(&(decimals,)),
            );
        }
        self.respond(
            token,
            &IERC20::totalSupplyCall {},
            IERC20::totalSupplyCall::abi_encode_returns(&(U256::from(1_000_000u64),)),
        );
    }

    /// Script WETH and USDC metadata.
    pub fn set_base_tokens(&self) {
        self.set_token(WETH_ADDRESS, "WETH", Some(18));
        self.set_token(USDC_ADDRESS, "USDC", Some(6));
    }

    /// Add block `number` with one successful transaction per entry of
    /// `txs`: the sender and the `(emitter, log)` pairs it produced. Log
    /// indexes run across the block. Moves the head forward when needed.
    pub fn add_block(&self, number: u64, txs: Vec<(Address, Vec<(Address, LogData)>)>) {
        let mut transactions = Vec::new();
        let mut receipts = Vec::new();
        let mut log_index = 0;

        for (tx_index, (sender, logs)) in (0u64..).zip(txs) {
            let hash = tx_hash(number, tx_index);
            transactions.push(ChainTransaction { hash, from: sender });
            let logs = logs
                .into_iter()
                .map(|(emitter, data)| {
                    let log = ChainLog {
                        address: emitter,
                        topics: data.topics().to_vec(),
                        data: data.data,
                        log_index,
                    };
                    log_index += 1;
                    log
                })
                .collect();
            receipts.push(ChainReceipt {
                tx_hash: hash,
                tx_index,
                success: true,
                logs,
            });
        }

        let block = ChainBlock {
            number,
            hash: B256::left_padding_from(&number.to_be_bytes()),
            timestamp: block_time(number),
            transactions,
        };
        self.blocks.lock().unwrap().insert(number, (block, receipts));
        self.head.fetch_max(number, Ordering::SeqCst);
    }

    /// Forget block `number`: fetches of it keep answering `None`.
    pub fn remove_block(&self, number: u64) {
        self.blocks.lock().unwrap().remove(&number);
    }

    /// Add empty blocks `from..=to`.
    pub fn add_empty_blocks(&self, from: u64, to: u64) {
        for number in from..=to {
            self.add_block(number, Vec::new());
        }
    }

    /// Make fetches of block `number` take `delay`.
    pub fn set_latency(&self, number: u64, delay: Duration) {
        self.latency.lock().unwrap().insert(number, delay);
    }

    /// Make every contract call take `delay`.
    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = delay;
    }

    /// Calls of `selector` on `to` so far.
    pub fn call_count(&self, to: Address, selector: [u8; 4]) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(addr, sel)| *addr == to && *sel == selector)
            .count()
    }

    /// All calls received by `to`.
    pub fn calls_to(&self, to: Address) -> usize {
        self.calls.lock().unwrap().iter().filter(|(addr, _)| *addr == to).count()
    }

    /// Heights fetched so far, in request order.
    pub fn fetched(&self) -> Vec<u64> {
        self.fetches.lock().unwrap().clone()
    }
}

/// Deterministic hash of the transaction at `tx_index` of block `number`.
pub fn tx_hash(number: u64, tx_index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&number.to_be_bytes());
    bytes[24..].copy_from_slice(&tx_index.to_be_bytes());
    B256::from(bytes)
}

/// Encode a `sol!` event as log data.
pub fn log_of<E: SolEvent>(event: &E) -> LogData {
    event.encode_log_data()
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn block_number(&self) -> IndexerResult<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block_by_number(&self, number: u64) -> IndexerResult<Option<ChainBlock>> {
        self.fetches.lock().unwrap().push(number);
        let delay = self.latency.lock().unwrap().get(&number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.blocks.lock().unwrap().get(&number).map(|(b, _)| b.clone()))
    }

    async fn block_receipts(&self, number: u64) -> IndexerResult<Vec<ChainReceipt>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&number)
            .map(|(_, r)| r.clone())
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes, _block: Option<u64>) -> IndexerResult<Bytes> {
        let mut selector = [0u8; 4];
        if data.len() >= 4 {
            selector.copy_from_slice(&data[..4]);
        }
        self.calls.lock().unwrap().push((to, selector));

        let delay = *self.call_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .unwrap()
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| IndexerError::rpc(format!("execution reverted: {to}"), None))
    }
}

#[async_trait]
impl HeadSubscriber for MockChain {
    async fn subscribe(&self) -> IndexerResult<HeadStream> {
        // Heads are seeded from block_number(); the stream only keeps the
        // subscription alive.
        Ok(futures_util::stream::pending::<IndexerResult<u64>>().boxed())
    }
}
