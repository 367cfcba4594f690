//! One decoder per routed topic.
//!
//! Each decoder validates the topic count and data length through the
//! `sol!` bindings and hands back the event payload in crate types.

use crate::abi::{
    IAerodromeFactory, IAerodromePool, IPancakeV3Pool, IUniswapV2Factory, IUniswapV2Pair,
    IUniswapV3Factory, IUniswapV3Pool,
};
use crate::error::{IndexerError, IndexerResult};
use crate::types::{EventKind, SwapAmounts};
use alloy::primitives::{Address, LogData, B256, U256};
use alloy::sol_types::SolEvent;

/// Payload of a decoded log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A factory announced a new pair or pool.
    Created {
        /// The new pair address
        pair: Address,
        /// On-chain token0
        token0: Address,
        /// On-chain token1
        token1: Address,
        /// Fee tier of concentrated-liquidity pools
        fee: Option<u32>,
    },
    /// An event emitted by a pair.
    Pool(EventKind),
}

/// The closed set of topics the router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// `PairCreated` of Uniswap V2 style factories
    V2PairCreated,
    /// `Mint` of V2 style pairs (also Aerodrome)
    V2Mint,
    /// `Burn` of V2 style pairs
    V2Burn,
    /// `Swap` of V2 style pairs
    V2Swap,
    /// `Sync(uint112,uint112)`
    V2Sync,
    /// `PoolCreated` of Uniswap V3 style factories
    V3PoolCreated,
    /// `Mint` of V3 style pools
    V3Mint,
    /// `Burn` of V3 style pools
    V3Burn,
    /// Uniswap V3 `Swap`
    UniswapV3Swap,
    /// PancakeSwap V3 `Swap` (with protocol fees)
    PancakeV3Swap,
    /// Aerodrome `PoolCreated`
    AerodromePoolCreated,
    /// Aerodrome `Burn` (indexed recipient)
    AerodromeBurn,
    /// Aerodrome `Swap`
    AerodromeSwap,
    /// `Sync(uint256,uint256)`
    AerodromeSync,
}

impl Decoder {
    /// Every decoder, one per topic.
    pub const ALL: [Self; 14] = [
        Self::V2PairCreated,
        Self::V2Mint,
        Self::V2Burn,
        Self::V2Swap,
        Self::V2Sync,
        Self::V3PoolCreated,
        Self::V3Mint,
        Self::V3Burn,
        Self::UniswapV3Swap,
        Self::PancakeV3Swap,
        Self::AerodromePoolCreated,
        Self::AerodromeBurn,
        Self::AerodromeSwap,
        Self::AerodromeSync,
    ];

    /// Topic0 this decoder handles.
    #[must_use]
    pub const fn topic(self) -> B256 {
        match self {
            Self::V2PairCreated => IUniswapV2Factory::PairCreated::SIGNATURE_HASH,
            Self::V2Mint => IUniswapV2Pair::Mint::SIGNATURE_HASH,
            Self::V2Burn => IUniswapV2Pair::Burn::SIGNATURE_HASH,
            Self::V2Swap => IUniswapV2Pair::Swap::SIGNATURE_HASH,
            Self::V2Sync => IUniswapV2Pair::Sync::SIGNATURE_HASH,
            Self::V3PoolCreated => IUniswapV3Factory::PoolCreated::SIGNATURE_HASH,
            Self::V3Mint => IUniswapV3Pool::Mint::SIGNATURE_HASH,
            Self::V3Burn => IUniswapV3Pool::Burn::SIGNATURE_HASH,
            Self::UniswapV3Swap => IUniswapV3Pool::Swap::SIGNATURE_HASH,
            Self::PancakeV3Swap => IPancakeV3Pool::Swap::SIGNATURE_HASH,
            Self::AerodromePoolCreated => IAerodromeFactory::PoolCreated::SIGNATURE_HASH,
            Self::AerodromeBurn => IAerodromePool::Burn::SIGNATURE_HASH,
            Self::AerodromeSwap => IAerodromePool::Swap::SIGNATURE_HASH,
            Self::AerodromeSync => IAerodromePool::Sync::SIGNATURE_HASH,
        }
    }

    /// Whether the topic is emitted by a factory.
    #[must_use]
    pub const fn is_creation(self) -> bool {
        matches!(
            self,
            Self::V2PairCreated | Self::V3PoolCreated | Self::AerodromePoolCreated
        )
    }

    /// Solidity signature, for log messages.
    #[must_use]
    pub const fn signature(self) -> &'static str {
        match self {
            Self::V2PairCreated => IUniswapV2Factory::PairCreated::SIGNATURE,
            Self::V2Mint => IUniswapV2Pair::Mint::SIGNATURE,
            Self::V2Burn => IUniswapV2Pair::Burn::SIGNATURE,
            Self::V2Swap => IUniswapV2Pair::Swap::SIGNATURE,
            Self::V2Sync => IUniswapV2Pair::Sync::SIGNATURE,
            Self::V3PoolCreated => IUniswapV3Factory::PoolCreated::SIGNATURE,
            Self::V3Mint => IUniswapV3Pool::Mint::SIGNATURE,
            Self::V3Burn => IUniswapV3Pool::Burn::SIGNATURE,
            Self::UniswapV3Swap => IUniswapV3Pool::Swap::SIGNATURE,
            Self::PancakeV3Swap => IPancakeV3Pool::Swap::SIGNATURE,
            Self::AerodromePoolCreated => IAerodromeFactory::PoolCreated::SIGNATURE,
            Self::AerodromeBurn => IAerodromePool::Burn::SIGNATURE,
            Self::AerodromeSwap => IAerodromePool::Swap::SIGNATURE,
            Self::AerodromeSync => IAerodromePool::Sync::SIGNATURE,
        }
    }

    /// Decode `log` with this decoder's binding.
    ///
    /// # Errors
    ///
    /// Returns a decoding error when the topic count or data length does not
    /// match the event.
    pub fn decode(self, log: &LogData) -> IndexerResult<Decoded> {
        let decoded = match self {
            Self::V2PairCreated => {
                let e = decode::<IUniswapV2Factory::PairCreated>(log)?;
                Decoded::Created {
                    pair: e.pair,
                    token0: e.token0,
                    token1: e.token1,
                    fee: None,
                }
            }
            Self::V3PoolCreated => {
                let e = decode::<IUniswapV3Factory::PoolCreated>(log)?;
                Decoded::Created {
                    pair: e.pool,
                    token0: e.token0,
                    token1: e.token1,
                    fee: Some(e.fee.to::<u32>()),
                }
            }
            Self::AerodromePoolCreated => {
                let e = decode::<IAerodromeFactory::PoolCreated>(log)?;
                Decoded::Created {
                    pair: e.pool,
                    token0: e.token0,
                    token1: e.token1,
                    fee: None,
                }
            }
            Self::V2Mint => {
                let e = decode::<IUniswapV2Pair::Mint>(log)?;
                Decoded::Pool(EventKind::Mint {
                    amount0: e.amount0,
                    amount1: e.amount1,
                })
            }
            Self::V3Mint => {
                let e = decode::<IUniswapV3Pool::Mint>(log)?;
                Decoded::Pool(EventKind::Mint {
                    amount0: e.amount0,
                    amount1: e.amount1,
                })
            }
            Self::V2Burn => {
                let e = decode::<IUniswapV2Pair::Burn>(log)?;
                Decoded::Pool(EventKind::Burn {
                    amount0: e.amount0,
                    amount1: e.amount1,
                })
            }
            Self::V3Burn => {
                let e = decode::<IUniswapV3Pool::Burn>(log)?;
                Decoded::Pool(EventKind::Burn {
                    amount0: e.amount0,
                    amount1: e.amount1,
                })
            }
            Self::AerodromeBurn => {
                let e = decode::<IAerodromePool::Burn>(log)?;
                Decoded::Pool(EventKind::Burn {
                    amount0: e.amount0,
                    amount1: e.amount1,
                })
            }
            Self::V2Swap => {
                let e = decode::<IUniswapV2Pair::Swap>(log)?;
                Decoded::Pool(EventKind::Swap(SwapAmounts::V2 {
                    amount0_in: e.amount0In,
                    amount1_in: e.amount1In,
                    amount0_out: e.amount0Out,
                    amount1_out: e.amount1Out,
                }))
            }
            Self::AerodromeSwap => {
                let e = decode::<IAerodromePool::Swap>(log)?;
                Decoded::Pool(EventKind::Swap(SwapAmounts::V2 {
                    amount0_in: e.amount0In,
                    amount1_in: e.amount1In,
                    amount0_out: e.amount0Out,
                    amount1_out: e.amount1Out,
                }))
            }
            Self::UniswapV3Swap => {
                let e = decode::<IUniswapV3Pool::Swap>(log)?;
                Decoded::Pool(EventKind::Swap(SwapAmounts::V3 {
                    amount0: e.amount0,
                    amount1: e.amount1,
                }))
            }
            Self::PancakeV3Swap => {
                let e = decode::<IPancakeV3Pool::Swap>(log)?;
                Decoded::Pool(EventKind::Swap(SwapAmounts::V3 {
                    amount0: e.amount0,
                    amount1: e.amount1,
                }))
            }
            Self::V2Sync => {
                let e = decode::<IUniswapV2Pair::Sync>(log)?;
                Decoded::Pool(EventKind::Sync {
                    reserve0: U256::from(e.reserve0),
                    reserve1: U256::from(e.reserve1),
                })
            }
            Self::AerodromeSync => {
                let e = decode::<IAerodromePool::Sync>(log)?;
                Decoded::Pool(EventKind::Sync {
                    reserve0: e.reserve0,
                    reserve1: e.reserve1,
                })
            }
        };
        Ok(decoded)
    }
}

fn decode<E: SolEvent>(log: &LogData) -> IndexerResult<E> {
    E::decode_log_data(log, true).map_err(|e| {
        IndexerError::decoding(
            format!(
                "{} with {} topics and {} data bytes",
                E::SIGNATURE,
                log.topics().len(),
                log.data.len()
            ),
            Some(Box::new(e)),
        )
    })
}
