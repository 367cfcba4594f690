//! Database models that map to SQL tables.
//!
//! Records are built from domain types right before insertion. Addresses and
//! hashes are stored as checksummed hex, 256-bit integers as decimal text.

use crate::error::{IndexerError, IndexerResult};
use crate::types::{Event, Pair, Token, TxResult};
use serde::{Deserialize, Serialize};

/// Convert a chain quantity to SQLite's signed integer.
pub(crate) fn to_i64(value: u64, what: &str) -> IndexerResult<i64> {
    i64::try_from(value).map_err(|e| {
        IndexerError::database(format!("{what} {value} does not fit INTEGER"), Some(Box::new(e)))
    })
}

/// A row of the `tokens` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TokenRecord {
    /// Token address
    pub address: String,
    /// Name
    pub name: String,
    /// Symbol
    pub symbol: String,
    /// Decimal places
    pub decimals: i64,
    /// Raw total supply (decimal)
    pub total_supply: String,
    /// First-seen block
    pub block_number: i64,
    /// First-seen block timestamp
    pub block_time: i64,
    /// Unix timestamp when the row was written
    pub created_at: i64,
}

impl TokenRecord {
    /// Record for a resolved token.
    ///
    /// # Errors
    ///
    /// Returns a database error when a height does not fit SQLite's integer.
    pub fn from_token(token: &Token) -> IndexerResult<Self> {
        Ok(Self {
            address: token.address.to_string(),
            name: token.name.clone(),
            symbol: token.symbol.clone(),
            decimals: i64::from(token.decimals),
            total_supply: token.total_supply.to_string(),
            block_number: to_i64(token.block_number, "token block")?,
            block_time: to_i64(token.block_time, "token block time")?,
            created_at: chrono::Utc::now().timestamp(),
        })
    }
}

/// A row of the `pairs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PairRecord {
    /// Pair address
    pub address: String,
    /// Numeric protocol id
    pub protocol_id: i64,
    /// Display token0 address
    pub token0_address: String,
    /// Display token0 symbol
    pub token0_symbol: String,
    /// Display token0 decimals
    pub token0_decimals: i64,
    /// Display token1 address
    pub token1_address: String,
    /// Display token1 symbol
    pub token1_symbol: String,
    /// Display token1 decimals
    pub token1_decimals: i64,
    /// On-chain order differs from display order
    pub tokens_reversed: bool,
    /// Fee tier (V3 pools)
    pub fee: Option<i64>,
    /// Creation block, 0 when discovered from a later event
    pub block_number: i64,
    /// Creation block timestamp
    pub block_time: i64,
    /// Unix timestamp when the row was written
    pub created_at: i64,
}

impl PairRecord {
    /// Record for a verified pair.
    ///
    /// # Errors
    ///
    /// Returns a database error when the pair has no protocol or a height
    /// does not fit SQLite's integer.
    pub fn from_pair(pair: &Pair) -> IndexerResult<Self> {
        let protocol = pair.protocol_id().ok_or_else(|| {
            IndexerError::database(format!("pair {} has no protocol", pair.address), None)
        })?;

        Ok(Self {
            address: pair.address.to_string(),
            protocol_id: i64::from(protocol.as_u8()),
            token0_address: pair.token0.address.to_string(),
            token0_symbol: pair.token0.symbol.clone(),
            token0_decimals: i64::from(pair.token0.decimals),
            token1_address: pair.token1.address.to_string(),
            token1_symbol: pair.token1.symbol.clone(),
            token1_decimals: i64::from(pair.token1.decimals),
            tokens_reversed: pair.tokens_reversed,
            fee: pair.fee.map(i64::from),
            block_number: to_i64(pair.block_number, "pair block")?,
            block_time: to_i64(pair.block_time, "pair block time")?,
            created_at: chrono::Utc::now().timestamp(),
        })
    }
}

/// A row of the `transactions` table: one attached event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionRecord {
    /// Database-assigned unique identifier
    pub id: i64,
    /// Block height
    pub block_number: i64,
    /// Block timestamp
    pub block_time: i64,
    /// Transaction hash
    pub tx_hash: String,
    /// Transaction index in the block
    pub tx_index: i64,
    /// Log index in the block
    pub log_index: i64,
    /// Transaction sender
    pub maker: String,
    /// Pair address
    pub pair_address: String,
    /// Numeric protocol id, 0 when unknown
    pub protocol_id: i64,
    /// Event kind name
    pub kind: String,
    /// `buy` / `sell` for swaps
    pub direction: Option<String>,
    /// Display token0 amount (raw, decimal)
    pub amount0: String,
    /// Display token1 amount (raw, decimal)
    pub amount1: String,
    /// Native token price of the block
    pub native_price: f64,
    /// Unix timestamp when the row was written
    pub created_at: i64,
}

impl TransactionRecord {
    /// Record for one event of `tx`.
    ///
    /// # Errors
    ///
    /// Returns a database error when an index does not fit SQLite's integer.
    pub fn from_event(tx: &TxResult, event: &Event, native_price: f64) -> IndexerResult<Self> {
        let (amount0, amount1) = event.display_amounts();
        Ok(Self {
            id: 0,
            block_number: to_i64(event.meta.block_number, "block")?,
            block_time: to_i64(event.meta.block_time, "block time")?,
            tx_hash: tx.tx_hash.to_string(),
            tx_index: to_i64(tx.tx_index, "tx index")?,
            log_index: to_i64(event.meta.log_index, "log index")?,
            maker: tx.maker.to_string(),
            pair_address: event.pair_address().to_string(),
            protocol_id: event.protocol_id().map_or(0, |p| i64::from(p.as_u8())),
            kind: event.kind.name().to_string(),
            direction: event.swap_trade().map(|t| t.direction.to_string()),
            amount0: amount0.to_string(),
            amount1: amount1.to_string(),
            native_price,
            created_at: chrono::Utc::now().timestamp(),
        })
    }
}

/// Row counts and the watermark, as shown by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexerStats {
    /// Highest block delivered to every sink
    pub finished_block: Option<u64>,
    /// Rows in `tokens`
    pub token_count: i64,
    /// Rows in `pairs`
    pub pair_count: i64,
    /// Rows in `transactions`
    pub transaction_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, LogMeta, ProtocolId, SwapAmounts, WETH_ADDRESS};
    use alloy::primitives::{address, Address, B256, U256};

    #[test]
    fn test_pair_record_requires_protocol() {
        let pair = Pair::new(Address::ZERO, WETH_ADDRESS, Address::ZERO);
        assert!(PairRecord::from_pair(&pair).is_err());
    }

    #[test]
    fn test_pair_record_fields() {
        let mut pair = Pair::new(
            address!("00000000000000000000000000000000000000bb"),
            WETH_ADDRESS,
            address!("000000000000000000000000000000000000c0de"),
        );
        pair.set_protocol(ProtocolId::UniswapV3);
        pair.fee = Some(500);
        pair.order_tokens();

        let record = PairRecord::from_pair(&pair).unwrap();
        assert_eq!(record.protocol_id, 2);
        assert_eq!(record.fee, Some(500));
        assert!(record.tokens_reversed);
        assert_eq!(record.token1_address, WETH_ADDRESS.to_string());
    }

    #[test]
    fn test_token_record_keeps_full_supply() {
        let token = Token {
            address: WETH_ADDRESS,
            total_supply: U256::MAX,
            decimals: 18,
            ..Token::default()
        };
        let record = TokenRecord::from_token(&token).unwrap();
        assert_eq!(record.total_supply, U256::MAX.to_string());
        assert_eq!(record.decimals, 18);
    }

    #[test]
    fn test_transaction_record_direction() {
        let mut event = Event::new(
            EventKind::Swap(SwapAmounts::V2 {
                amount0_in: U256::from(3),
                amount1_in: U256::ZERO,
                amount0_out: U256::ZERO,
                amount1_out: U256::from(2),
            }),
            Address::ZERO,
            vec![ProtocolId::Aerodrome],
            LogMeta {
                block_number: 7,
                log_index: 1,
                ..LogMeta::default()
            },
        );
        event.maker = Address::repeat_byte(1);
        let tx = TxResult::new(B256::ZERO, 0, Address::repeat_byte(1));

        let record = TransactionRecord::from_event(&tx, &event, 2500.0).unwrap();
        assert_eq!(record.direction.as_deref(), Some("sell"));
        assert_eq!(record.protocol_id, 5);
        assert_eq!((record.amount0.as_str(), record.amount1.as_str()), ("3", "2"));
    }

    #[test]
    fn test_to_i64_rejects_overflow() {
        assert!(to_i64(u64::MAX, "block").is_err());
        assert_eq!(to_i64(42, "block").unwrap(), 42);
    }
}
