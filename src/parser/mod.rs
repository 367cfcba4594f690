//! Receipt log routing.
//!
//! [`TopicRouter`] looks up topic0 in a fixed decoder table and turns a log
//! into an [`Event`]. Creation events are only accepted from registered
//! factories and carry a provisional [`Pair`] built from the event itself;
//! pair events carry the candidate protocols that may have emitted them and
//! are resolved later by the pair service.

pub mod decode;

pub use decode::{Decoded, Decoder};

use crate::error::{IndexerError, IndexerResult};
use crate::registry::ProtocolRegistry;
use crate::types::{filter_by_tokens, ChainLog, Event, EventKind, LogMeta, Pair};
use alloy::primitives::{LogData, B256};
use std::collections::HashMap;
use std::sync::Arc;

/// Topic0 to decoder dispatch.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    registry: Arc<ProtocolRegistry>,
    decoders: HashMap<B256, Decoder>,
}

impl TopicRouter {
    /// Router over every supported topic.
    #[must_use]
    pub fn new(registry: Arc<ProtocolRegistry>) -> Self {
        let decoders = Decoder::ALL.into_iter().map(|d| (d.topic(), d)).collect();
        Self { registry, decoders }
    }

    /// Whether `topic` is routed.
    #[must_use]
    pub fn handles(&self, topic: &B256) -> bool {
        self.decoders.contains_key(topic)
    }

    /// Decode `log` into an event positioned at `meta` (the log index is
    /// taken from the log).
    ///
    /// Returns `None` for logs without topics or with an unknown topic0, and
    /// `Some(Err(_))` when the payload does not decode or a creation event
    /// comes from an unregistered factory.
    #[must_use]
    pub fn route(&self, log: &ChainLog, meta: LogMeta) -> Option<IndexerResult<Event>> {
        let topic = log.topics.first()?;
        let decoder = self.decoders.get(topic).copied()?;
        let meta = LogMeta {
            log_index: log.log_index,
            ..meta
        };
        Some(self.build(decoder, *topic, log, meta))
    }

    fn build(&self, decoder: Decoder, topic: B256, log: &ChainLog, meta: LogMeta) -> IndexerResult<Event> {
        if decoder.is_creation() && !self.registry.is_allowed_factory(&topic, log.address) {
            return Err(IndexerError::decoding(
                format!(
                    "{} emitted by unregistered factory {}",
                    decoder.signature(),
                    log.address
                ),
                None,
            ));
        }

        let data = LogData::new_unchecked(log.topics.clone(), log.data.clone());
        match decoder.decode(&data)? {
            Decoded::Created {
                pair,
                token0,
                token1,
                fee,
            } => {
                let protocol = self.registry.protocol_of_factory(log.address).ok_or_else(|| {
                    IndexerError::state(format!("factory {} has no protocol", log.address), None)
                })?;

                let mut provisional = Pair::new(pair, token0, token1);
                provisional.set_protocol(protocol);
                provisional.fee = fee;
                provisional.block_number = meta.block_number;
                provisional.block_time = meta.block_time;
                if let Some(code) = filter_by_tokens(token0, token1) {
                    provisional.mark_filtered(code);
                }

                let kind = EventKind::PairCreated {
                    pair,
                    token0,
                    token1,
                    initial_liquidity: None,
                };
                let mut event = Event::new(kind, log.address, vec![protocol], meta);
                event.set_pair(provisional);
                Ok(event)
            }
            Decoded::Pool(kind) => Ok(Event::new(
                kind,
                log.address,
                self.registry.candidates(&topic).to_vec(),
                meta,
            )),
        }
    }
}
