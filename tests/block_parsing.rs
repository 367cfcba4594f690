//! Integration tests for block parsing: routing, pair attachment, new entity
//! collection and event linking, over blocks served by a scripted chain.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use alloy::primitives::aliases::U112;
use alloy::primitives::{address, Address, U256};
use common::{block_time, log_of, MockChain, TEST_RETRY};
use dex_block_indexer::abi::{IUniswapV2Factory, IUniswapV2Pair};
use dex_block_indexer::block_getter::BlockGetter;
use dex_block_indexer::block_parser::BlockParser;
use dex_block_indexer::cache::{Cache, MemoryCache};
use dex_block_indexer::pair_service::PairService;
use dex_block_indexer::parser::TopicRouter;
use dex_block_indexer::pricing::PriceService;
use dex_block_indexer::registry::ProtocolRegistry;
use dex_block_indexer::rpc::{ChainRpc, ContractCaller};
use dex_block_indexer::sequencer::Sequencer;
use dex_block_indexer::types::{
    BlockContext, EventKind, ProtocolId, TradeDirection, WETH_ADDRESS,
};
use std::sync::Arc;

const FACTORY: Address = address!("00000000000000000000000000000000000f0001");
const PAIR: Address = address!("00000000000000000000000000000000000a0001");
const MEME: Address = address!("000000000000000000000000000000000000beef");
const TRADER: Address = address!("0000000000000000000000000000000000007777");

struct Harness {
    chain: Arc<MockChain>,
    getter: BlockGetter,
    parser: BlockParser,
}

impl Harness {
    fn new() -> Self {
        let chain = Arc::new(MockChain::with_price());
        chain.set_token(WETH_ADDRESS, "WETH", Some(18));
        chain.set_token(MEME, "MEME", Some(9));

        let rpc: Arc<dyn ChainRpc> = Arc::clone(&chain) as Arc<dyn ChainRpc>;
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let registry = Arc::new(ProtocolRegistry::with_factories([(
            ProtocolId::UniswapV2,
            FACTORY,
        )]));
        let caller = ContractCaller::new(Arc::clone(&rpc), TEST_RETRY);

        let getter = BlockGetter::new(
            rpc,
            Arc::new(Sequencer::new("fetch", true)),
            TEST_RETRY,
            1,
        );
        let parser = BlockParser::new(
            Arc::new(TopicRouter::new(Arc::clone(&registry))),
            Arc::new(PairService::new(Arc::clone(&cache), caller.clone(), registry)),
            Arc::new(PriceService::new(cache, caller)),
            Arc::new(Sequencer::new("parse", true)),
            1,
        );
        Self {
            chain,
            getter,
            parser,
        }
    }

    async fn context(&self, number: u64) -> BlockContext {
        let mut context = self.getter.fetch_block(number).await.expect("fetch failed");
        context.native_price = Some(2000.0);
        context
    }
}

fn pair_created() -> IUniswapV2Factory::PairCreated {
    IUniswapV2Factory::PairCreated {
        token0: WETH_ADDRESS,
        token1: MEME,
        pair: PAIR,
        pairIndex: U256::from(1u64),
    }
}

fn mint(amount0: u64, amount1: u64) -> IUniswapV2Pair::Mint {
    IUniswapV2Pair::Mint {
        sender: TRADER,
        amount0: U256::from(amount0),
        amount1: U256::from(amount1),
    }
}

#[tokio::test]
async fn test_creation_links_first_mint_and_reports_new_entities() {
    let harness = Harness::new();
    harness.chain.add_block(
        10,
        vec![(
            TRADER,
            vec![
                (FACTORY, log_of(&pair_created())),
                (PAIR, log_of(&mint(5_000, 40))),
            ],
        )],
    );

    let mut context = harness.context(10).await;
    let result = harness.parser.parse_block(&mut context).await;

    assert_eq!(result.block_number, 10);
    assert_eq!(result.block_time, block_time(10));
    assert_eq!(result.txs.len(), 1);

    let events = &result.txs[0].events;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].meta.log_index, 0);
    assert_eq!(events[1].meta.log_index, 1);
    assert!(events.iter().all(|e| e.maker == TRADER));
    assert!(matches!(
        events[0].kind,
        EventKind::PairCreated {
            initial_liquidity: Some(_),
            ..
        }
    ));
    // Display order is (MEME, WETH)
    assert_eq!(
        events[0].display_amounts(),
        (U256::from(40u64), U256::from(5_000u64))
    );

    let pair = result.new_pairs.get(&PAIR).expect("pair reported");
    assert_eq!(pair.protocol_id(), Some(ProtocolId::UniswapV2));
    assert_eq!(pair.block_number, 10);
    assert!(pair.tokens_reversed);

    assert_eq!(result.new_tokens.len(), 2);
    let meme = result.new_tokens.get(&MEME).unwrap();
    assert_eq!(meme.block_number, 10);
    assert_eq!(meme.block_time, block_time(10));

    // The creation event needs no factory verification
    assert_eq!(harness.chain.calls_to(FACTORY), 0);
}

#[tokio::test]
async fn test_known_pair_is_not_reported_twice() {
    let harness = Harness::new();
    harness.chain.add_block(
        10,
        vec![(TRADER, vec![(FACTORY, log_of(&pair_created()))])],
    );
    harness.chain.add_block(
        11,
        vec![(
            TRADER,
            vec![(
                PAIR,
                log_of(&IUniswapV2Pair::Sync {
                    reserve0: U112::from(7u64),
                    reserve1: U112::from(9u64),
                }),
            )],
        )],
    );

    let mut first = harness.context(10).await;
    harness.parser.parse_block(&mut first).await;
    let mut second = harness.context(11).await;
    let result = harness.parser.parse_block(&mut second).await;

    assert_eq!(result.event_count(), 1);
    assert!(result.new_pairs.is_empty());
    assert!(result.new_tokens.is_empty());
    assert_eq!(
        result.txs[0].events[0].display_amounts(),
        (U256::from(9u64), U256::from(7u64))
    );
}

#[tokio::test]
async fn test_swap_direction_follows_display_order() {
    let harness = Harness::new();
    harness.chain.add_block(
        10,
        vec![(TRADER, vec![(FACTORY, log_of(&pair_created()))])],
    );
    // WETH (on-chain token0) goes in, MEME comes out
    harness.chain.add_block(
        11,
        vec![(
            TRADER,
            vec![(
                PAIR,
                log_of(&IUniswapV2Pair::Swap {
                    sender: TRADER,
                    amount0In: U256::from(3u64),
                    amount1In: U256::ZERO,
                    amount0Out: U256::ZERO,
                    amount1Out: U256::from(900u64),
                    to: TRADER,
                }),
            )],
        )],
    );

    let mut first = harness.context(10).await;
    harness.parser.parse_block(&mut first).await;
    let mut second = harness.context(11).await;
    let result = harness.parser.parse_block(&mut second).await;

    let trade = result.txs[0].events[0].swap_trade().expect("classified");
    assert_eq!(trade.direction, TradeDirection::Buy);
    assert_eq!(trade.amount0, U256::from(900u64));
    assert_eq!(trade.amount1, U256::from(3u64));
}

#[tokio::test]
async fn test_failed_receipts_and_foreign_logs_are_skipped() {
    let harness = Harness::new();
    let impostor = address!("00000000000000000000000000000000000f0bad");
    harness.chain.add_block(
        12,
        vec![
            // Creation from a factory outside the registry
            (TRADER, vec![(impostor, log_of(&pair_created()))]),
            // Reverted transaction
            (TRADER, vec![(FACTORY, log_of(&pair_created()))]),
        ],
    );

    let mut context = harness.context(12).await;
    context.receipts[1].success = false;
    let result = harness.parser.parse_block(&mut context).await;

    assert!(result.txs.is_empty());
    assert!(result.new_pairs.is_empty());
    assert_eq!(harness.chain.calls_to(MEME), 0);
    // Receipts are handed back to the context
    assert_eq!(context.receipts.len(), 2);
}

#[tokio::test]
async fn test_events_of_filtered_pairs_are_dropped() {
    let harness = Harness::new();
    let junk = address!("00000000000000000000000000000000000a0bad");
    let other = address!("000000000000000000000000000000000000cafe");
    harness.chain.set_pair_tokens(junk, MEME, other);
    harness.chain.add_block(
        13,
        vec![
            (TRADER, vec![(junk, log_of(&mint(1, 1)))]),
            (TRADER, vec![(FACTORY, log_of(&pair_created()))]),
        ],
    );

    let mut context = harness.context(13).await;
    let result = harness.parser.parse_block(&mut context).await;

    assert_eq!(result.txs.len(), 1);
    assert_eq!(result.txs[0].tx_index, 1);
    assert!(!result.new_pairs.contains_key(&junk));
}
