//! Pair and token resolution.
//!
//! Given a pair address seen in a log, the service answers "which tokens does
//! it trade and which protocol owns it", reading from the cache first and
//! falling back to on-chain discovery:
//!
//! 1. `token0()` / `token1()` on the pair, concurrently.
//! 2. Token filter: identical tokens or no base token filters the pair.
//! 3. Verification: each candidate protocol's factory is asked whether it
//!    created the address, in the order the caller listed them. The first
//!    match becomes the owning protocol.
//! 4. Token metadata, cache-first. `decimals()` is mandatory, the other
//!    fields are best-effort.
//!
//! Every outcome, including filtered ones, is cached so an address is
//! resolved at most once. Concurrent lookups of the same address collapse
//! into a single discovery through [`SingleFlight`]: only the caller that ran
//! the discovery sees the `new_*` flags, so new entities reach the sinks once.

use crate::cache::Cache;
use crate::error::{IndexerError, IndexerResult};
use crate::registry::ProtocolRegistry;
use crate::rpc::ContractCaller;
use crate::singleflight::SingleFlight;
use crate::types::{filter_by_tokens, FilterCode, Pair, PairWrap, ProtocolId, Token, VerifyStyle};
use alloy::primitives::Address;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Resolves pairs and tokens with caching and request collapsing.
pub struct PairService {
    cache: Arc<dyn Cache>,
    caller: ContractCaller,
    registry: Arc<ProtocolRegistry>,
    group: SingleFlight<Result<PairWrap, String>>,
}

impl PairService {
    /// Service reading through `cache` and calling contracts with `caller`.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, caller: ContractCaller, registry: Arc<ProtocolRegistry>) -> Self {
        Self {
            cache,
            caller,
            registry,
            group: SingleFlight::new(),
        }
    }

    /// Store a pair in the cache.
    ///
    /// # Errors
    ///
    /// Propagates cache failures.
    pub async fn set_pair(&self, pair: &Pair) -> IndexerResult<()> {
        self.cache.set_pair(pair).await
    }

    /// Resolve the tokens of a pair whose token addresses are already known,
    /// typically the provisional pair of a creation event.
    ///
    /// A pair that is already cached is returned as-is with no new flags.
    /// A filtered pair is cached and returned without any calls.
    ///
    /// # Errors
    ///
    /// Propagates cache failures. Contract failures filter the pair instead.
    #[instrument(skip(self, pair), fields(pair = %pair.address))]
    pub async fn get_tokens(&self, pair: Pair) -> IndexerResult<PairWrap> {
        if let Some(cached) = self.cache.get_pair(pair.address).await? {
            return Ok(PairWrap::known(cached));
        }
        if pair.filtered {
            self.set_pair(&pair).await?;
            return Ok(PairWrap::known(pair));
        }
        self.resolve_tokens(pair).await
    }

    /// Resolve a pair from its address alone.
    ///
    /// `candidates` lists the protocols whose contracts emit the log's topic;
    /// they are tried in order during verification.
    ///
    /// # Errors
    ///
    /// Propagates cache failures. Contract failures filter the pair instead.
    #[instrument(skip(self, candidates), fields(pair = %address, leader = tracing::field::Empty))]
    pub async fn get_pair_and_tokens(
        &self,
        address: Address,
        candidates: &[ProtocolId],
    ) -> IndexerResult<PairWrap> {
        if let Some(cached) = self.cache.get_pair(address).await? {
            return Ok(PairWrap::known(cached));
        }

        let key = address.to_string();
        let (outcome, leader) = self
            .group
            .run(&key, || async {
                self.discover(address, candidates)
                    .await
                    .map_err(|e| e.chain_string())
            })
            .await;
        tracing::Span::current().record("leader", leader);

        match outcome {
            Ok(wrap) if leader => Ok(wrap),
            Ok(wrap) => Ok(wrap.without_flags()),
            Err(message) => Err(IndexerError::state(
                format!("pair resolution for {address} failed: {message}"),
                None,
            )),
        }
    }

    async fn discover(&self, address: Address, candidates: &[ProtocolId]) -> IndexerResult<PairWrap> {
        // Another flight may have finished between our cache miss and now.
        if let Some(cached) = self.cache.get_pair(address).await? {
            return Ok(PairWrap::known(cached));
        }

        let (token0, token1) = tokio::join!(self.caller.token0(address), self.caller.token1(address));
        let mut pair = match (token0, token1) {
            (Err(e), _) => {
                error!(pair = %address, error = %e, "token0() failed, pair filtered");
                Pair::filtered_at(address, FilterCode::GetToken0)
            }
            (_, Err(e)) => {
                error!(pair = %address, error = %e, "token1() failed, pair filtered");
                Pair::filtered_at(address, FilterCode::GetToken1)
            }
            (Ok(token0), Ok(token1)) => Pair::new(address, token0, token1),
        };

        if !pair.filtered {
            if let Some(code) = filter_by_tokens(pair.token0.address, pair.token1.address) {
                pair.mark_filtered(code);
            }
        }
        if !pair.filtered && !self.verify(&mut pair, candidates).await {
            pair.mark_filtered(FilterCode::VerifyFailed);
        }

        if pair.filtered {
            debug!(pair = %address, code = %pair.filter_code, "Pair filtered");
            self.set_pair(&pair).await?;
            return Ok(PairWrap::known(pair));
        }

        self.resolve_tokens(pair).await
    }

    /// Try each candidate's factory; the first one that claims the address
    /// becomes the owner.
    async fn verify(&self, pair: &mut Pair, candidates: &[ProtocolId]) -> bool {
        let (token0, token1) = pair.onchain_tokens();

        for &protocol in candidates {
            let Some(factory) = self.registry.factory(protocol) else {
                continue;
            };

            let verified = match protocol.verify_style() {
                VerifyStyle::FactoryGetPair => self
                    .caller
                    .get_pair(factory, token0, token1)
                    .await
                    .map(|queried| (queried == pair.address, None)),
                VerifyStyle::FactoryGetPool => match self.caller.pool_fee(pair.address).await {
                    Ok(fee) => self
                        .caller
                        .get_pool(factory, token0, token1, fee)
                        .await
                        .map(|queried| (queried == pair.address, Some(fee))),
                    Err(e) => Err(e),
                },
                VerifyStyle::FactoryIsPool => self
                    .caller
                    .is_pool(factory, pair.address)
                    .await
                    .map(|is_pool| (is_pool, None)),
            };

            match verified {
                Ok((true, fee)) => {
                    pair.set_protocol(protocol);
                    if fee.is_some() {
                        pair.fee = fee;
                    }
                    debug!(pair = %pair.address, protocol = %protocol, "Pair verified");
                    return true;
                }
                Ok((false, _)) => {}
                Err(e) => {
                    debug!(pair = %pair.address, protocol = %protocol, error = %e, "Verification call failed, skipping candidate");
                }
            }
        }
        false
    }

    async fn resolve_tokens(&self, mut pair: Pair) -> IndexerResult<PairWrap> {
        let (address0, address1) = pair.onchain_tokens();
        let (token0, token1) = tokio::join!(self.token(address0), self.token(address1));
        let (token0, token0_cached) = token0?;
        let (token1, token1_cached) = token1?;

        if token0.filtered || token1.filtered {
            let code = if token0.filtered {
                FilterCode::GetToken0
            } else {
                FilterCode::GetToken1
            };
            pair.mark_filtered(code);
            warn!(pair = %pair.address, code = %code, "Token metadata unusable, pair filtered");
            self.set_pair(&pair).await?;
            return Ok(PairWrap::known(pair));
        }

        pair.attach_tokens(&token0, &token1);
        let ((display0, cached0), (display1, cached1)) = if pair.tokens_reversed {
            ((token1, token1_cached), (token0, token0_cached))
        } else {
            ((token0, token0_cached), (token1, token1_cached))
        };

        self.set_pair(&pair).await?;
        Ok(PairWrap {
            pair,
            new_pair: true,
            new_token0: !cached0,
            new_token1: !cached1,
            token0: (!cached0).then_some(display0),
            token1: (!cached1).then_some(display1),
        })
    }

    /// Token metadata and whether it came from the cache.
    async fn token(&self, address: Address) -> IndexerResult<(Token, bool)> {
        if let Some(cached) = self.cache.get_token(address).await? {
            return Ok((cached, true));
        }

        let token = self.fetch_token(address).await;
        self.cache.set_token(&token).await?;
        Ok((token, false))
    }

    #[instrument(skip(self), fields(token = %address))]
    async fn fetch_token(&self, address: Address) -> Token {
        let (name, symbol, decimals, total_supply) = tokio::join!(
            self.caller.name(address),
            self.caller.symbol(address),
            self.caller.decimals(address),
            self.caller.total_supply(address),
        );

        let mut token = Token {
            address,
            name: name.unwrap_or_default(),
            symbol: symbol.unwrap_or_default(),
            total_supply: total_supply.unwrap_or_default(),
            ..Token::default()
        };

        match decimals {
            Ok(decimals) => token.decimals = decimals,
            Err(e) => {
                warn!(token = %address, error = %e, "decimals() failed, token filtered");
                token.filtered = true;
            }
        }
        token
    }
}
