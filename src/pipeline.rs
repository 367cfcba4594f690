//! End-to-end wiring of the indexer.
//!
//! ```text
//! heads ─▶ HeadTracker ─▶ dispatch ─▶ fetch pool ─▶ [fetch seq] ─▶ parse pool ─▶ [parse seq] ─▶ ResultHandler
//!                                                                     │                            │
//!                                                            PairService / PriceService      db, file, broadcast
//! ```
//!
//! Cancelling the stop token stops dispatch; blocks already queued drain
//! through every stage. The first stage failure cancels the rest and is
//! returned from [`Pipeline::run`].

use crate::block_getter::{BlockGetter, HeadSettings};
use crate::block_parser::{BlockParser, ResultHandler};
use crate::cache::{Cache, MemoryCache};
use crate::config::Config;
use crate::db::{create_pool, DbSink, Repository};
use crate::error::{IndexerError, IndexerResult};
use crate::pair_service::PairService;
use crate::parser::TopicRouter;
use crate::pricing::PriceService;
use crate::publisher::{BroadcastPublisher, FilePublisher, ResultSink};
use crate::registry::ProtocolRegistry;
use crate::rpc::{ChainRpc, ContractCaller, HeadSubscriber, HttpChain, WsHeadSubscriber};
use crate::sequencer::Sequencer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long stages may keep draining after a stop before they are aborted.
///
/// A block dropped after exhausting its fetch retries leaves its successors
/// waiting in the sequencer forever; only an abort releases them.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// A configured indexer run.
pub struct Pipeline {
    config: Config,
    registry: Arc<ProtocolRegistry>,
    publisher: BroadcastPublisher,
}

impl Pipeline {
    /// Pipeline for `config` indexing the Base protocol set.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let publisher = BroadcastPublisher::new(config.publish_channel_capacity());
        Self {
            config,
            registry: Arc::new(ProtocolRegistry::base()),
            publisher,
        }
    }

    /// Replace the protocol registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ProtocolRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// In-process bus receiving every committed block. Subscribe before
    /// calling [`Pipeline::run`] to see the first block.
    #[must_use]
    pub const fn publisher(&self) -> &BroadcastPublisher {
        &self.publisher
    }

    /// Connect to the configured endpoints and run until `shutdown` fires,
    /// the end block is committed, or a stage fails.
    ///
    /// Resolves to the last committed height.
    ///
    /// # Errors
    ///
    /// Returns setup failures (RPC, database, configuration) and the first
    /// fatal stage error.
    pub async fn run(&self, shutdown: CancellationToken) -> IndexerResult<Option<u64>> {
        let chain: Arc<dyn ChainRpc> = Arc::new(HttpChain::connect(self.config.rpc_http_url()).await?);
        let heads: Arc<dyn HeadSubscriber> =
            Arc::new(WsHeadSubscriber::new(self.config.rpc_ws_url().to_string()));
        self.run_with(chain, heads, shutdown).await
    }

    /// [`Pipeline::run`] over caller-supplied chain access.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::run`].
    pub async fn run_with(
        &self,
        chain: Arc<dyn ChainRpc>,
        heads: Arc<dyn HeadSubscriber>,
        shutdown: CancellationToken,
    ) -> IndexerResult<Option<u64>> {
        let config = &self.config;
        let stop = shutdown.child_token();

        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let sinks = self.build_sinks(cache.as_ref()).await?;
        let sink_names: Vec<&str> = sinks.iter().map(|s| s.name()).collect();

        let caller = ContractCaller::new(Arc::clone(&chain), *config.call_retry());
        let pairs = Arc::new(PairService::new(
            Arc::clone(&cache),
            caller.clone(),
            Arc::clone(&self.registry),
        ));
        let prices = Arc::new(PriceService::new(Arc::clone(&cache), caller));
        let router = Arc::new(TopicRouter::new(Arc::clone(&self.registry)));

        let fetch_sequencer = Arc::new(Sequencer::new("fetch", config.enable_sequencer()));
        let parse_sequencer = Arc::new(Sequencer::new("parse", config.enable_sequencer()));

        let getter = BlockGetter::new(
            chain,
            Arc::clone(&fetch_sequencer),
            *config.fetch_retry(),
            config.fetch_pool_size(),
        );
        let start = getter
            .resolve_start_height(config.start_block(), cache.as_ref())
            .await?;
        fetch_sequencer.init(start - 1)?;
        parse_sequencer.init(start - 1)?;

        info!(
            start,
            end = config.end_block(),
            sequencer = config.enable_sequencer(),
            fetch_pool = config.fetch_pool_size(),
            parse_pool = config.parse_pool_size(),
            sinks = ?sink_names,
            "Pipeline starting"
        );

        let (height_tx, height_rx) = mpsc::channel(config.fetch_queue_size());
        let (fetched_tx, fetched_rx) = mpsc::channel(config.parse_queue_size());
        let (parsed_tx, parsed_rx) = mpsc::channel(config.parse_queue_size());

        let settings = HeadSettings {
            idle_timeout: config.head_idle_timeout(),
            initial_delay: config.reconnect_initial_delay(),
            max_delay: config.reconnect_max_delay(),
        };
        let head_loop = getter.spawn_head_loop(heads, settings, stop.clone());
        let dispatch = getter.spawn_dispatch(start, config.end_block(), height_tx, stop.clone());
        let fetch = getter.spawn_fetch_pool(height_rx, fetched_tx);

        let parser = BlockParser::new(
            router,
            pairs,
            Arc::clone(&prices),
            parse_sequencer,
            config.parse_pool_size(),
        );
        let parse = parser.spawn_pool(fetched_rx, parsed_tx);
        let commit = ResultHandler::new(Arc::clone(&cache), sinks).spawn(parsed_rx);

        let prefetch = (config.price_prefetch_workers() > 0).then(|| {
            prices.spawn_prefetch(
                start,
                config.price_prefetch_workers(),
                getter.head_tracker(),
                stop.clone(),
            )
        });

        let outcome = supervise(fetch, parse, commit, &stop).await;

        stop.cancel();
        for handle in [Some(head_loop), Some(dispatch), prefetch].into_iter().flatten() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err() {
                abort.abort();
            }
        }

        match &outcome {
            Ok(last) => info!(last, "Pipeline stopped"),
            Err(e) => error!(error = %e, "Pipeline failed"),
        }
        outcome
    }

    async fn build_sinks(&self, cache: &dyn Cache) -> IndexerResult<Vec<Arc<dyn ResultSink>>> {
        let mut sinks: Vec<Arc<dyn ResultSink>> = Vec::new();

        if self.config.enable_db_sink() {
            let repository = Repository::new(create_pool(self.config.database_url()).await?);
            if let Some(block) = repository.finished_block().await? {
                cache.set_finished_block(block).await?;
                info!(watermark = block, "Resuming from persisted watermark");
            }
            sinks.push(Arc::new(DbSink::new(repository)));
        }
        if let Some(path) = self.config.publish_file() {
            sinks.push(Arc::new(FilePublisher::open(path).await?));
        }
        sinks.push(Arc::new(self.publisher.clone()));
        Ok(sinks)
    }
}

/// Wait for the commit stage to finish, cancelling `stop` on the first stage
/// failure and aborting stages that do not drain within [`DRAIN_TIMEOUT`]
/// after a stop.
async fn supervise(
    fetch: JoinHandle<IndexerResult<()>>,
    parse: JoinHandle<IndexerResult<()>>,
    mut commit: JoinHandle<IndexerResult<Option<u64>>>,
    stop: &CancellationToken,
) -> IndexerResult<Option<u64>> {
    let aborts = [fetch.abort_handle(), parse.abort_handle()];
    let mut stages = JoinSet::new();
    stages.spawn(async move { ("fetch", fetch.await) });
    stages.spawn(async move { ("parse", parse.await) });

    let mut failure: Option<IndexerError> = None;
    let mut deadline: Option<Instant> = None;
    let mut aborted = false;

    let committed = loop {
        let drain_expired = async move {
            match deadline {
                Some(at) if !aborted => tokio::time::sleep_until(at).await,
                _ => std::future::pending().await,
            }
        };

        tokio::select! {
            committed = &mut commit => break committed,
            Some(joined) = stages.join_next() => {
                let (stage, result) = match joined {
                    Ok((stage, Ok(result))) => (stage, result),
                    Ok((stage, Err(e))) if e.is_cancelled() => (stage, Ok(())),
                    Ok((stage, Err(e))) => (stage, Err(IndexerError::invariant(format!("{stage} stage panicked: {e}")))),
                    Err(e) => ("supervisor", Err(IndexerError::invariant(format!("stage join failed: {e}")))),
                };
                if let Err(e) = result {
                    error!(stage, error = %e, "Pipeline stage failed, stopping");
                    failure.get_or_insert(e);
                    stop.cancel();
                }
            }
            () = stop.cancelled(), if deadline.is_none() => {
                info!(drain_timeout_secs = DRAIN_TIMEOUT.as_secs(), "Stop requested, draining");
                deadline = Some(Instant::now() + DRAIN_TIMEOUT);
            }
            () = drain_expired => {
                warn!("Stages did not drain in time, aborting");
                for abort in &aborts {
                    abort.abort();
                }
                aborted = true;
            }
        }
    };

    let committed = committed
        .map_err(|e| IndexerError::invariant(format!("commit stage panicked: {e}")))
        .and_then(|result| result);

    match (failure, committed) {
        (_, Err(e)) => Err(e),
        (Some(e), Ok(_)) => Err(e),
        (None, Ok(last)) => Ok(last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_stage() -> JoinHandle<IndexerResult<()>> {
        tokio::spawn(async { Ok(()) })
    }

    #[tokio::test]
    async fn test_supervise_returns_last_commit() {
        let stop = CancellationToken::new();
        let commit = tokio::spawn(async { Ok(Some(12)) });

        let last = supervise(finished_stage(), finished_stage(), commit, &stop)
            .await
            .unwrap();
        assert_eq!(last, Some(12));
        assert!(!stop.is_cancelled());
    }

    #[tokio::test]
    async fn test_supervise_stops_on_stage_failure() {
        let stop = CancellationToken::new();
        let failing = tokio::spawn(async { Err(IndexerError::invariant("out of order")) });
        let watcher = stop.clone();
        let commit = tokio::spawn(async move {
            watcher.cancelled().await;
            Ok(Some(3))
        });

        let err = supervise(failing, finished_stage(), commit, &stop)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvariantViolation { .. }));
        assert!(stop.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_aborts_stuck_stage_after_drain_timeout() {
        let stop = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<u64>(1);

        // Holds the sender as a stage waiting on a missing height would
        let stuck = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
            Ok(())
        });
        let commit = tokio::spawn(async move {
            while rx.recv().await.is_some() {}
            Ok(None)
        });

        stop.cancel();
        let last = supervise(stuck, finished_stage(), commit, &stop).await.unwrap();
        assert_eq!(last, None);
    }
}
