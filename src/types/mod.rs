//! Domain types shared by every pipeline stage.
//!
//! - [`block`]: fetched chain data and the [`BlockContext`] that carries a block
//!   through the pipeline
//! - [`event`]: the closed set of decoded DEX events
//! - [`pair`] / [`token`]: resolution targets and their filter codes
//! - [`protocol`]: supported protocol ids
//! - [`result`]: per-transaction and per-block output

pub mod block;
pub mod event;
pub mod pair;
pub mod protocol;
pub mod result;
pub mod token;

pub use block::{BlockContext, ChainBlock, ChainLog, ChainReceipt, ChainTransaction};
pub use event::{Event, EventKind, LogMeta, SwapAmounts, SwapTrade, TradeDirection};
pub use pair::{filter_by_tokens, FilterCode, Pair, PairWrap};
pub use protocol::{ProtocolId, VerifyStyle};
pub use result::{BlockResult, TxResult};
pub use token::{Token, TokenCore, USDC_ADDRESS, WETH_ADDRESS, WETH_USDC_PAIR};
