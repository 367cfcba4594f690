//! Typed DEX events decoded from receipt logs.

use super::pair::Pair;
use super::protocol::ProtocolId;
use alloy::primitives::{Address, B256, I256, U256};
use std::fmt;

/// Direction of a swap from the point of view of display token0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    /// Token0 left the pool (bought with token1)
    Buy,
    /// Token0 entered the pool (sold for token1)
    Sell,
}

impl TradeDirection {
    #[must_use]
    const fn flipped(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified swap with amounts in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapTrade {
    /// Buy or sell of display token0
    pub direction: TradeDirection,
    /// Display token0 amount (raw)
    pub amount0: U256,
    /// Display token1 amount (raw)
    pub amount1: U256,
}

/// Raw swap amounts, in on-chain token order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapAmounts {
    /// Constant-product swap (Uniswap V2, PancakeSwap V2, Aerodrome)
    V2 {
        /// token0 sent into the pair
        amount0_in: U256,
        /// token1 sent into the pair
        amount1_in: U256,
        /// token0 sent out of the pair
        amount0_out: U256,
        /// token1 sent out of the pair
        amount1_out: U256,
    },
    /// Concentrated-liquidity swap; positive amounts enter the pool
    V3 {
        /// Signed token0 delta
        amount0: I256,
        /// Signed token1 delta
        amount1: I256,
    },
}

impl SwapAmounts {
    /// Classify the swap given the pair's `tokens_reversed` flag.
    ///
    /// Returns `None` for degenerate swaps with no input side.
    #[must_use]
    pub fn classify(&self, tokens_reversed: bool) -> Option<SwapTrade> {
        let (direction, amount0, amount1) = match *self {
            Self::V2 {
                amount0_in,
                amount1_in,
                amount0_out,
                amount1_out,
            } => {
                if amount0_in > U256::ZERO {
                    (TradeDirection::Sell, amount0_in, amount1_out)
                } else if amount1_in > U256::ZERO {
                    (TradeDirection::Buy, amount0_out, amount1_in)
                } else {
                    return None;
                }
            }
            Self::V3 { amount0, amount1 } => {
                if amount0.is_negative() {
                    (TradeDirection::Buy, amount0.unsigned_abs(), amount1.unsigned_abs())
                } else if amount1.is_negative() {
                    (TradeDirection::Sell, amount0.unsigned_abs(), amount1.unsigned_abs())
                } else {
                    return None;
                }
            }
        };

        if tokens_reversed {
            Some(SwapTrade {
                direction: direction.flipped(),
                amount0: amount1,
                amount1: amount0,
            })
        } else {
            Some(SwapTrade {
                direction,
                amount0,
                amount1,
            })
        }
    }
}

/// The closed set of events the router understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A factory created a pair (`PairCreated` / `PoolCreated`)
    PairCreated {
        /// The new pair address
        pair: Address,
        /// On-chain token0
        token0: Address,
        /// On-chain token1
        token1: Address,
        /// Amounts of the first mint into the pair in the same transaction
        initial_liquidity: Option<(U256, U256)>,
    },
    /// Liquidity added
    Mint {
        /// token0 amount (on-chain order)
        amount0: U256,
        /// token1 amount (on-chain order)
        amount1: U256,
    },
    /// Liquidity removed
    Burn {
        /// token0 amount (on-chain order)
        amount0: U256,
        /// token1 amount (on-chain order)
        amount1: U256,
    },
    /// A trade
    Swap(SwapAmounts),
    /// Reserves after a constant-product state change
    Sync {
        /// token0 reserve (on-chain order)
        reserve0: U256,
        /// token1 reserve (on-chain order)
        reserve1: U256,
    },
}

impl EventKind {
    /// Stable lowercase name used in storage and messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PairCreated { .. } => "pair_created",
            Self::Mint { .. } => "mint",
            Self::Burn { .. } => "burn",
            Self::Swap(_) => "swap",
            Self::Sync { .. } => "sync",
        }
    }
}

/// Position of a log inside the chain, shared by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogMeta {
    /// Transaction hash
    pub tx_hash: B256,
    /// Transaction index in the block
    pub tx_index: u64,
    /// Log index in the block
    pub log_index: u64,
    /// Block height
    pub block_number: u64,
    /// Block timestamp
    pub block_time: u64,
}

/// A decoded event plus everything needed to attach pair context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Emitting contract (the factory for creation events, else the pair)
    pub address: Address,
    /// Protocols whose contracts emit this topic
    pub protocol_ids: Vec<ProtocolId>,
    /// Position in the chain
    pub meta: LogMeta,
    /// Transaction sender
    pub maker: Address,
    /// Attached pair: provisional for creation events, resolved after lookup
    pub pair: Option<Pair>,
}

impl Event {
    /// Event without pair context.
    #[must_use]
    pub const fn new(
        kind: EventKind,
        address: Address,
        protocol_ids: Vec<ProtocolId>,
        meta: LogMeta,
    ) -> Self {
        Self {
            kind,
            address,
            protocol_ids,
            meta,
            maker: Address::ZERO,
            pair: None,
        }
    }

    /// Address of the pair this event concerns.
    #[must_use]
    pub const fn pair_address(&self) -> Address {
        match &self.kind {
            EventKind::PairCreated { pair, .. } => *pair,
            _ => self.address,
        }
    }

    /// Whether the event carries its own provisional pair.
    #[must_use]
    pub const fn self_describes_pair(&self) -> bool {
        matches!(self.kind, EventKind::PairCreated { .. })
    }

    /// Whether this is a creation event.
    #[must_use]
    pub const fn is_pair_created(&self) -> bool {
        self.self_describes_pair()
    }

    /// Whether this is a liquidity add.
    #[must_use]
    pub const fn is_mint(&self) -> bool {
        matches!(self.kind, EventKind::Mint { .. })
    }

    /// Owning protocol of the attached pair, else the single candidate.
    #[must_use]
    pub fn protocol_id(&self) -> Option<ProtocolId> {
        self.pair
            .as_ref()
            .and_then(Pair::protocol_id)
            .or_else(|| match self.protocol_ids.as_slice() {
                [only] => Some(*only),
                _ => None,
            })
    }

    /// Attach the resolved pair.
    pub fn set_pair(&mut self, pair: Pair) {
        self.pair = Some(pair);
    }

    fn tokens_reversed(&self) -> bool {
        self.pair.as_ref().is_some_and(|p| p.tokens_reversed)
    }

    /// Trade classification for swaps (requires the pair for orientation).
    #[must_use]
    pub fn swap_trade(&self) -> Option<SwapTrade> {
        match &self.kind {
            EventKind::Swap(amounts) => amounts.classify(self.tokens_reversed()),
            _ => None,
        }
    }

    /// Token amounts in display order.
    #[must_use]
    pub fn display_amounts(&self) -> (U256, U256) {
        let onchain = match &self.kind {
            EventKind::PairCreated {
                initial_liquidity, ..
            } => initial_liquidity.unwrap_or_default(),
            EventKind::Mint { amount0, amount1 } | EventKind::Burn { amount0, amount1 } => {
                (*amount0, *amount1)
            }
            EventKind::Sync { reserve0, reserve1 } => (*reserve0, *reserve1),
            EventKind::Swap(_) => {
                return self
                    .swap_trade()
                    .map_or((U256::ZERO, U256::ZERO), |t| (t.amount0, t.amount1));
            }
        };
        if self.tokens_reversed() {
            (onchain.1, onchain.0)
        } else {
            onchain
        }
    }

    /// Record the first mint of a freshly created pair.
    pub fn link_mint(&mut self, mint: &Self) {
        if let (
            EventKind::PairCreated {
                initial_liquidity, ..
            },
            EventKind::Mint { amount0, amount1 },
        ) = (&mut self.kind, &mint.kind)
        {
            *initial_liquidity = Some((*amount0, *amount1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn i(v: i64) -> I256 {
        I256::try_from(v).unwrap()
    }

    #[test]
    fn test_v2_sell_token0() {
        let swap = SwapAmounts::V2 {
            amount0_in: u(100),
            amount1_in: u(0),
            amount0_out: u(0),
            amount1_out: u(7),
        };
        let trade = swap.classify(false).unwrap();
        assert_eq!(trade.direction, TradeDirection::Sell);
        assert_eq!((trade.amount0, trade.amount1), (u(100), u(7)));
    }

    #[test]
    fn test_v2_buy_token0() {
        let swap = SwapAmounts::V2 {
            amount0_in: u(0),
            amount1_in: u(7),
            amount0_out: u(100),
            amount1_out: u(0),
        };
        let trade = swap.classify(false).unwrap();
        assert_eq!(trade.direction, TradeDirection::Buy);
        assert_eq!((trade.amount0, trade.amount1), (u(100), u(7)));
    }

    #[test]
    fn test_reversal_inverts_equivalent_trades() {
        // Selling 100 MEME for 7 WETH, once on a (MEME, WETH) pair and once
        // on a (WETH, MEME) pair.
        let direct = SwapAmounts::V2 {
            amount0_in: u(100),
            amount1_in: u(0),
            amount0_out: u(0),
            amount1_out: u(7),
        };
        let reversed = SwapAmounts::V2 {
            amount0_in: u(0),
            amount1_in: u(100),
            amount0_out: u(7),
            amount1_out: u(0),
        };

        assert_eq!(direct.classify(false), reversed.classify(true));
        assert_eq!(
            reversed.classify(true).map(|t| t.direction),
            Some(TradeDirection::Sell)
        );
    }

    #[test]
    fn test_v3_classification() {
        let buy = SwapAmounts::V3 {
            amount0: i(-500),
            amount1: i(20),
        };
        let trade = buy.classify(false).unwrap();
        assert_eq!(trade.direction, TradeDirection::Buy);
        assert_eq!((trade.amount0, trade.amount1), (u(500), u(20)));

        let sell = SwapAmounts::V3 {
            amount0: i(500),
            amount1: i(-20),
        };
        assert_eq!(sell.classify(false).unwrap().direction, TradeDirection::Sell);
        assert_eq!(sell.classify(true).unwrap().direction, TradeDirection::Buy);
        assert_eq!(sell.classify(true).unwrap().amount0, u(20));
    }

    #[test]
    fn test_degenerate_swap_is_unclassified() {
        let swap = SwapAmounts::V2 {
            amount0_in: u(0),
            amount1_in: u(0),
            amount0_out: u(1),
            amount1_out: u(1),
        };
        assert_eq!(swap.classify(false), None);
    }

    #[test]
    fn test_pair_address_and_linking() {
        let factory = address!("8909Dc15e40173Ff4699343b6eB8132c65e18eC6");
        let pair = address!("00000000000000000000000000000000000000bb");
        let mut created = Event::new(
            EventKind::PairCreated {
                pair,
                token0: Address::ZERO,
                token1: Address::ZERO,
                initial_liquidity: None,
            },
            factory,
            vec![ProtocolId::UniswapV2],
            LogMeta::default(),
        );
        let mint = Event::new(
            EventKind::Mint {
                amount0: u(5),
                amount1: u(9),
            },
            pair,
            vec![ProtocolId::UniswapV2, ProtocolId::PancakeV2],
            LogMeta::default(),
        );

        assert_eq!(created.pair_address(), pair);
        assert_eq!(mint.pair_address(), pair);
        assert!(created.self_describes_pair());
        assert_eq!(created.protocol_id(), Some(ProtocolId::UniswapV2));
        assert_eq!(mint.protocol_id(), None);

        created.link_mint(&mint);
        assert_eq!(created.display_amounts(), (u(5), u(9)));
    }

    #[test]
    fn test_display_amounts_follow_reversal() {
        let mut pair = Pair::new(Address::ZERO, Address::ZERO, Address::ZERO);
        pair.tokens_reversed = true;
        let mut sync = Event::new(
            EventKind::Sync {
                reserve0: u(1),
                reserve1: u(2),
            },
            Address::ZERO,
            vec![ProtocolId::UniswapV2],
            LogMeta::default(),
        );
        sync.set_pair(pair);
        assert_eq!(sync.display_amounts(), (u(2), u(1)));
    }
}
