//! # DEX Block Indexer
//!
//! Block-ordered DEX event indexer for Base using [Alloy](https://github.com/alloy-rs/alloy).
//!
//! Blocks are fetched and parsed concurrently, then restored to strict height
//! order before any result is persisted or published. Every swap, mint, burn
//! and sync of the supported protocols is attached to a verified pair whose
//! tokens are resolved once and cached.
//!
//! ## Architecture
//!
//! ```text
//! WebSocket heads ─▶ block_getter ─▶ Sequencer ─▶ block_parser ─▶ Sequencer ─▶ sinks
//!                         │                            │
//!                      ChainRpc              parser + pair_service + pricing
//! ```
//!
//! - [`sequencer`]: per-hop ordering barrier keyed by block height
//! - [`block_getter`]: head tracking, dispatch and the bounded fetch pool
//! - [`parser`]: topic routing and event decoding
//! - [`block_parser`]: the parse pool and the ordered commit stage
//! - [`pair_service`]: pair and token resolution with protocol discovery
//! - [`pricing`]: native token price per block
//! - [`db`], [`publisher`]: result sinks
//! - [`pipeline`]: wiring of all of the above
//!
//! ## Quick Start
//!
//! ```bash
//! # Follow the chain head
//! cargo run --release -- run
//!
//! # Bounded run, without persisting
//! ENABLE_DB_SINK=false cargo run --release -- run --start-block 20000000 --end-block 20000010 --print
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::IndexerResult<T>`](error::IndexerResult).
//! Fatal errors (sequencing violations, sink failures) stop the pipeline and
//! terminate the binary with status 1.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod abi;
pub mod block_getter;
pub mod block_parser;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod observability;
pub mod pair_service;
pub mod parser;
pub mod pipeline;
pub mod pricing;
pub mod publisher;
pub mod registry;
pub mod rpc;
pub mod sequencer;
pub mod singleflight;
pub mod types;
