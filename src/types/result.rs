//! Per-transaction and per-block parse output.

use super::event::Event;
use super::pair::Pair;
use super::protocol::ProtocolId;
use super::token::Token;
use alloy::primitives::{Address, B256};
use std::collections::BTreeMap;

/// Events emitted by one successful transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    /// Transaction hash
    pub tx_hash: B256,
    /// Transaction index in the block
    pub tx_index: u64,
    /// Transaction sender
    pub maker: Address,
    /// Attached events in log order
    pub events: Vec<Event>,
}

impl TxResult {
    /// Empty result for a transaction sent by `maker`.
    #[must_use]
    pub const fn new(tx_hash: B256, tx_index: u64, maker: Address) -> Self {
        Self {
            tx_hash,
            tx_index,
            maker,
            events: Vec::new(),
        }
    }

    /// Append an event, stamping the maker onto it.
    pub fn add_event(&mut self, mut event: Event) {
        event.maker = self.maker;
        self.events.push(event);
    }

    /// Whether no event survived parsing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Attach the i-th mint of each (pair, protocol) to the i-th creation
    /// event for the same pair.
    pub fn link_events(&mut self) {
        let mut groups: BTreeMap<(Address, Option<ProtocolId>), (Vec<usize>, Vec<usize>)> =
            BTreeMap::new();
        for (index, event) in self.events.iter().enumerate() {
            let key = (event.pair_address(), event.protocol_id());
            if event.is_pair_created() {
                groups.entry(key).or_default().0.push(index);
            } else if event.is_mint() {
                groups.entry(key).or_default().1.push(index);
            }
        }

        for (created, mints) in groups.into_values() {
            for (created_index, mint_index) in created.into_iter().zip(mints) {
                let mint = self.events[mint_index].clone();
                self.events[created_index].link_mint(&mint);
            }
        }
    }
}

/// Everything the parser produced for one block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockResult {
    /// Block height
    pub block_number: u64,
    /// Block timestamp
    pub block_time: u64,
    /// Native token USD price used for valuation
    pub native_price: f64,
    /// Transactions with at least one attached event
    pub txs: Vec<TxResult>,
    /// Pairs first discovered in this block
    pub new_pairs: BTreeMap<Address, Pair>,
    /// Tokens first discovered in this block
    pub new_tokens: BTreeMap<Address, Token>,
}

impl BlockResult {
    /// Empty result for a block.
    #[must_use]
    pub const fn new(block_number: u64, block_time: u64, native_price: f64) -> Self {
        Self {
            block_number,
            block_time,
            native_price,
            txs: Vec::new(),
            new_pairs: BTreeMap::new(),
            new_tokens: BTreeMap::new(),
        }
    }

    /// Keep a transaction result if it has events.
    pub fn add_tx_result(&mut self, tx: TxResult) {
        if !tx.is_empty() {
            self.txs.push(tx);
        }
    }

    /// Record a newly discovered pair, first report per address wins.
    pub fn add_new_pair(&mut self, pair: &Pair) {
        self.new_pairs
            .entry(pair.address)
            .or_insert_with(|| pair.clone());
    }

    /// Record a newly discovered token, first report per address wins.
    pub fn add_new_token(&mut self, token: &Token) {
        self.new_tokens
            .entry(token.address)
            .or_insert_with(|| token.clone());
    }

    /// Total number of events across all transactions.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.txs.iter().map(|tx| tx.events.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::event::{EventKind, LogMeta};
    use alloy::primitives::{address, U256};

    const PAIR: Address = address!("00000000000000000000000000000000000000bb");
    const FACTORY: Address = address!("8909Dc15e40173Ff4699343b6eB8132c65e18eC6");

    fn created() -> Event {
        Event::new(
            EventKind::PairCreated {
                pair: PAIR,
                token0: Address::ZERO,
                token1: Address::ZERO,
                initial_liquidity: None,
            },
            FACTORY,
            vec![ProtocolId::UniswapV2],
            LogMeta::default(),
        )
    }

    fn resolved_mint(amount: u64) -> Event {
        let mut pair = Pair::new(PAIR, Address::ZERO, Address::ZERO);
        pair.set_protocol(ProtocolId::UniswapV2);
        let mut mint = Event::new(
            EventKind::Mint {
                amount0: U256::from(amount),
                amount1: U256::from(amount * 2),
            },
            PAIR,
            vec![ProtocolId::UniswapV2, ProtocolId::PancakeV2],
            LogMeta::default(),
        );
        mint.set_pair(pair);
        mint
    }

    #[test]
    fn test_add_event_stamps_maker() {
        let maker = address!("1000000000000000000000000000000000000001");
        let mut tx = TxResult::new(B256::ZERO, 0, maker);
        tx.add_event(resolved_mint(1));
        assert_eq!(tx.events[0].maker, maker);
    }

    #[test]
    fn test_link_first_mint_to_creation() {
        let mut tx = TxResult::new(B256::ZERO, 0, Address::ZERO);
        tx.add_event(created());
        tx.add_event(resolved_mint(10));
        tx.add_event(resolved_mint(99));
        tx.link_events();

        match &tx.events[0].kind {
            EventKind::PairCreated {
                initial_liquidity, ..
            } => assert_eq!(
                *initial_liquidity,
                Some((U256::from(10u64), U256::from(20u64)))
            ),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_block_result_dedups_new_entities() {
        let mut result = BlockResult::new(1, 2, 3000.0);
        let mut first = Pair::new(PAIR, Address::ZERO, Address::ZERO);
        first.block_number = 1;
        let mut second = first.clone();
        second.block_number = 99;

        result.add_new_pair(&first);
        result.add_new_pair(&second);
        assert_eq!(result.new_pairs.len(), 1);
        assert_eq!(result.new_pairs[&PAIR].block_number, 1);

        result.add_tx_result(TxResult::new(B256::ZERO, 0, Address::ZERO));
        assert!(result.txs.is_empty());
    }
}
