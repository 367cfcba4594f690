//! Supported DEX protocols.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a DEX protocol deployment.
///
/// The numeric values are persisted with pairs and transactions and must not
/// be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolId {
    /// Uniswap V2 constant-product pairs
    UniswapV2 = 1,
    /// Uniswap V3 concentrated-liquidity pools
    UniswapV3 = 2,
    /// PancakeSwap V2 (Uniswap V2 fork)
    PancakeV2 = 3,
    /// PancakeSwap V3 (Uniswap V3 fork)
    PancakeV3 = 4,
    /// Aerodrome (Solidly-style pools)
    Aerodrome = 5,
}

/// How a protocol's factory confirms that it owns a pair address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStyle {
    /// `factory.getPair(token0, token1)` must return the pair address.
    FactoryGetPair,
    /// `pool.fee()` then `factory.getPool(token0, token1, fee)` must return it.
    FactoryGetPool,
    /// `factory.isPool(pair)` must return true.
    FactoryIsPool,
}

impl ProtocolId {
    /// Every supported protocol, in id order.
    pub const ALL: [Self; 5] = [
        Self::UniswapV2,
        Self::UniswapV3,
        Self::PancakeV2,
        Self::PancakeV3,
        Self::Aerodrome,
    ];

    /// Numeric id as persisted.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look up a protocol by persisted id.
    #[must_use]
    pub const fn from_u8(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::UniswapV2),
            2 => Some(Self::UniswapV3),
            3 => Some(Self::PancakeV2),
            4 => Some(Self::PancakeV3),
            5 => Some(Self::Aerodrome),
            _ => None,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UniswapV2 => "UniswapV2",
            Self::UniswapV3 => "UniswapV3",
            Self::PancakeV2 => "PancakeV2",
            Self::PancakeV3 => "PancakeV3",
            Self::Aerodrome => "Aerodrome",
        }
    }

    /// Display name for a persisted id, `"Unknown"` when unrecognised.
    #[must_use]
    pub const fn name_of(id: u8) -> &'static str {
        match Self::from_u8(id) {
            Some(protocol) => protocol.name(),
            None => "Unknown",
        }
    }

    /// Verification strategy used during protocol discovery.
    #[must_use]
    pub const fn verify_style(self) -> VerifyStyle {
        match self {
            Self::UniswapV2 | Self::PancakeV2 => VerifyStyle::FactoryGetPair,
            Self::UniswapV3 | Self::PancakeV3 => VerifyStyle::FactoryGetPool,
            Self::Aerodrome => VerifyStyle::FactoryIsPool,
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
