//! ERC-20 token descriptors and the base-token ordering rule.

use alloy::primitives::{address, Address, U256};

/// Wrapped ETH on Base.
pub const WETH_ADDRESS: Address = address!("4200000000000000000000000000000000000006");

/// Native USDC on Base.
pub const USDC_ADDRESS: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// Uniswap V2 WETH/USDC pair used as the native token price oracle.
pub const WETH_USDC_PAIR: Address = address!("88A43bbDF9D098eEC7bCEda4e2494615dfD9bB9C");

/// Ordering rank of a token: base tokens are displayed last, stablecoins
/// after WETH.
#[must_use]
pub fn base_rank(token: Address) -> u8 {
    if token == USDC_ADDRESS {
        2
    } else if token == WETH_ADDRESS {
        1
    } else {
        0
    }
}

/// Whether `token` is one of the quote assets pairs are priced against.
#[must_use]
pub fn is_base_token(token: Address) -> bool {
    base_rank(token) > 0
}

/// The token fields embedded in every pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenCore {
    /// Token contract address
    pub address: Address,
    /// Symbol (empty when the contract does not expose one)
    pub symbol: String,
    /// Decimal places
    pub decimals: u8,
}

impl TokenCore {
    /// Descriptor with only the address known.
    #[must_use]
    pub fn unresolved(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }
}

/// Full token metadata, resolved at most once per address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Token {
    /// Token contract address
    pub address: Address,
    /// Name (empty when `name()` is missing or reverts)
    pub name: String,
    /// Symbol (empty when `symbol()` is missing or reverts)
    pub symbol: String,
    /// Decimal places
    pub decimals: u8,
    /// Raw total supply, zero when unavailable
    pub total_supply: U256,
    /// Block in which the token was first seen
    pub block_number: u64,
    /// Timestamp of that block
    pub block_time: u64,
    /// Set when `decimals()` could not be read; such tokens never price
    pub filtered: bool,
}

impl Token {
    /// Core descriptor for embedding into a pair.
    #[must_use]
    pub fn core(&self) -> TokenCore {
        TokenCore {
            address: self.address,
            symbol: self.symbol.clone(),
            decimals: self.decimals,
        }
    }
}
