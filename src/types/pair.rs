//! Trading pair descriptors and resolution results.

use super::protocol::ProtocolId;
use super::token::{base_rank, is_base_token, Token, TokenCore};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a pair (or the event that referenced it) was excluded.
///
/// The numeric codes are persisted alongside filtered pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FilterCode {
    /// Not filtered
    #[default]
    None = 0,
    /// `token0()` could not be read, or token0 metadata is unusable
    GetToken0 = 1,
    /// `token1()` could not be read, or token1 metadata is unusable
    GetToken1 = 2,
    /// No candidate protocol's factory claims the address
    VerifyFailed = 3,
    /// A creation event came from a factory outside the registry
    WrongFactory = 4,
    /// A creation event's payload could not be decoded
    ParseEventInput = 5,
    /// Neither side is a base token
    NoBaseToken = 6,
    /// Both sides are the same token
    IdenticalTokens = 7,
}

impl FilterCode {
    /// Numeric code as persisted.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look up a code by persisted value.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::GetToken0),
            2 => Some(Self::GetToken1),
            3 => Some(Self::VerifyFailed),
            4 => Some(Self::WrongFactory),
            5 => Some(Self::ParseEventInput),
            6 => Some(Self::NoBaseToken),
            7 => Some(Self::IdenticalTokens),
            _ => None,
        }
    }
}

impl fmt::Display for FilterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::GetToken0 => "get_token0",
            Self::GetToken1 => "get_token1",
            Self::VerifyFailed => "verify_failed",
            Self::WrongFactory => "wrong_factory",
            Self::ParseEventInput => "parse_event_input",
            Self::NoBaseToken => "no_base_token",
            Self::IdenticalTokens => "identical_tokens",
        };
        f.write_str(name)
    }
}

/// Reject token pairs that can never be priced.
///
/// Returns the filter code to apply, or `None` when the pair is acceptable.
#[must_use]
pub fn filter_by_tokens(token0: Address, token1: Address) -> Option<FilterCode> {
    if token0 == token1 {
        return Some(FilterCode::IdenticalTokens);
    }
    if !is_base_token(token0) && !is_base_token(token1) {
        return Some(FilterCode::NoBaseToken);
    }
    None
}

/// A two-token trading venue owned by one DEX protocol.
///
/// `token0`/`token1` are kept in display order: when the on-chain order put a
/// base token first the two are swapped and `tokens_reversed` is set, so raw
/// event amounts (always in on-chain order) must be read through that flag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pair {
    /// Pair or pool contract address
    pub address: Address,
    /// First token in display order
    pub token0: TokenCore,
    /// Second token in display order (the base token when there is one)
    pub token1: TokenCore,
    /// On-chain order differs from display order
    pub tokens_reversed: bool,
    /// Fee tier for concentrated-liquidity pools
    pub fee: Option<u32>,
    /// Creation block, zero when discovered from a later event
    pub block_number: u64,
    /// Creation block timestamp
    pub block_time: u64,
    protocol_id: Option<ProtocolId>,
    /// Permanently excluded from results
    pub filtered: bool,
    /// Reason for exclusion
    pub filter_code: FilterCode,
}

impl Pair {
    /// Pair with only the on-chain token addresses known.
    #[must_use]
    pub fn new(address: Address, token0: Address, token1: Address) -> Self {
        Self {
            address,
            token0: TokenCore::unresolved(token0),
            token1: TokenCore::unresolved(token1),
            ..Self::default()
        }
    }

    /// Pair that could not even be read; carries only its address.
    #[must_use]
    pub fn filtered_at(address: Address, code: FilterCode) -> Self {
        let mut pair = Self {
            address,
            ..Self::default()
        };
        pair.mark_filtered(code);
        pair
    }

    /// Owning protocol, once verified.
    #[must_use]
    pub const fn protocol_id(&self) -> Option<ProtocolId> {
        self.protocol_id
    }

    /// Record the owning protocol. The first assignment wins; returns whether
    /// `protocol` is now the recorded one.
    pub fn set_protocol(&mut self, protocol: ProtocolId) -> bool {
        match self.protocol_id {
            Some(existing) => existing == protocol,
            None => {
                self.protocol_id = Some(protocol);
                true
            }
        }
    }

    /// Exclude the pair permanently.
    pub fn mark_filtered(&mut self, code: FilterCode) {
        self.filtered = true;
        self.filter_code = code;
    }

    /// Token addresses in on-chain order.
    #[must_use]
    pub const fn onchain_tokens(&self) -> (Address, Address) {
        if self.tokens_reversed {
            (self.token1.address, self.token0.address)
        } else {
            (self.token0.address, self.token1.address)
        }
    }

    /// Fill both token descriptors from resolved metadata given in on-chain
    /// order, then apply the display ordering.
    pub fn attach_tokens(&mut self, onchain0: &Token, onchain1: &Token) {
        self.tokens_reversed = false;
        self.token0 = onchain0.core();
        self.token1 = onchain1.core();
        self.order_tokens();
    }

    /// Apply the canonical display order (higher base rank last).
    ///
    /// Returns whether the tokens were swapped by this call.
    pub fn order_tokens(&mut self) -> bool {
        if base_rank(self.token0.address) > base_rank(self.token1.address) {
            std::mem::swap(&mut self.token0, &mut self.token1);
            self.tokens_reversed = !self.tokens_reversed;
            return true;
        }
        false
    }
}

/// The outcome of a pair resolution.
///
/// The `new_*` flags mark entities discovered by this resolution (as opposed
/// to cache hits) so they are propagated to sinks exactly once. Token flags
/// follow display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairWrap {
    /// The resolved (possibly filtered) pair
    pub pair: Pair,
    /// The pair itself was discovered now
    pub new_pair: bool,
    /// Display token0 was resolved now
    pub new_token0: bool,
    /// Display token1 was resolved now
    pub new_token1: bool,
    /// Display token0 metadata when `new_token0`
    pub token0: Option<Token>,
    /// Display token1 metadata when `new_token1`
    pub token1: Option<Token>,
}

impl PairWrap {
    /// Wrap a pair that was served from cache or filtered: nothing is new.
    #[must_use]
    pub const fn known(pair: Pair) -> Self {
        Self {
            pair,
            new_pair: false,
            new_token0: false,
            new_token1: false,
            token0: None,
            token1: None,
        }
    }

    /// Same pair with every discovery flag cleared.
    #[must_use]
    pub fn without_flags(self) -> Self {
        Self::known(self.pair)
    }

    /// Whether anything in this wrap was freshly discovered.
    #[must_use]
    pub const fn has_new_entities(&self) -> bool {
        self.new_pair || self.new_token0 || self.new_token1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::token::{USDC_ADDRESS, WETH_ADDRESS};
    use alloy::primitives::address;

    const MEME: Address = address!("00000000000000000000000000000000000000aa");
    const PAIR: Address = address!("00000000000000000000000000000000000000bb");

    fn token(address: Address, symbol: &str) -> Token {
        Token {
            address,
            symbol: symbol.to_string(),
            decimals: 18,
            ..Token::default()
        }
    }

    #[test]
    fn test_filter_by_tokens() {
        assert_eq!(filter_by_tokens(MEME, MEME), Some(FilterCode::IdenticalTokens));
        assert_eq!(
            filter_by_tokens(MEME, address!("00000000000000000000000000000000000000cc")),
            Some(FilterCode::NoBaseToken)
        );
        assert_eq!(filter_by_tokens(MEME, WETH_ADDRESS), None);
        assert_eq!(filter_by_tokens(WETH_ADDRESS, USDC_ADDRESS), None);
    }

    #[test]
    fn test_non_base_token0_is_not_reversed() {
        let mut pair = Pair::new(PAIR, MEME, WETH_ADDRESS);
        pair.attach_tokens(&token(MEME, "MEME"), &token(WETH_ADDRESS, "WETH"));

        assert!(!pair.tokens_reversed);
        assert_eq!(pair.token0.symbol, "MEME");
        assert_eq!(pair.token1.symbol, "WETH");
        assert_eq!(pair.onchain_tokens(), (MEME, WETH_ADDRESS));
    }

    #[test]
    fn test_base_token0_is_reversed() {
        let mut pair = Pair::new(PAIR, WETH_ADDRESS, MEME);
        pair.attach_tokens(&token(WETH_ADDRESS, "WETH"), &token(MEME, "MEME"));

        assert!(pair.tokens_reversed);
        assert_eq!(pair.token0.address, MEME);
        assert_eq!(pair.token1.address, WETH_ADDRESS);
        assert_eq!(pair.onchain_tokens(), (WETH_ADDRESS, MEME));
    }

    #[test]
    fn test_weth_usdc_keeps_stablecoin_last() {
        let mut pair = Pair::new(PAIR, WETH_ADDRESS, USDC_ADDRESS);
        pair.attach_tokens(&token(WETH_ADDRESS, "WETH"), &token(USDC_ADDRESS, "USDC"));
        assert!(!pair.tokens_reversed);
    }

    #[test]
    fn test_protocol_is_set_once() {
        let mut pair = Pair::new(PAIR, MEME, WETH_ADDRESS);
        assert!(pair.set_protocol(ProtocolId::UniswapV2));
        assert!(!pair.set_protocol(ProtocolId::PancakeV2));
        assert!(pair.set_protocol(ProtocolId::UniswapV2));
        assert_eq!(pair.protocol_id(), Some(ProtocolId::UniswapV2));
    }

    #[test]
    fn test_filtered_pair() {
        let pair = Pair::filtered_at(PAIR, FilterCode::VerifyFailed);
        assert!(pair.filtered);
        assert_eq!(pair.filter_code, FilterCode::VerifyFailed);
        assert_eq!(FilterCode::from_u8(pair.filter_code.as_u8()), Some(FilterCode::VerifyFailed));
    }

    #[test]
    fn test_wrap_flags() {
        let wrap = PairWrap {
            pair: Pair::new(PAIR, MEME, WETH_ADDRESS),
            new_pair: true,
            new_token0: true,
            new_token1: false,
            token0: Some(token(MEME, "MEME")),
            token1: None,
        };
        assert!(wrap.has_new_entities());
        let cleared = wrap.without_flags();
        assert!(!cleared.has_new_entities());
        assert!(cleared.token0.is_none());
    }
}
