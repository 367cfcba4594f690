//! Block parsing and the ordered commit stage.
//!
//! ```text
//! BlockContext (height order) ──▶ parse pool ──▶ Sequencer ──▶ ResultHandler ──▶ sinks
//!                                     │                                        │
//!                               PairService                          cache watermark
//! ```
//!
//! Parse workers run concurrently and commit through their own
//! [`Sequencer`], so the [`ResultHandler`] sees results in height order and
//! can advance the finished-block watermark after every sink accepted the
//! block.

use crate::cache::Cache;
use crate::error::{IndexerError, IndexerResult};
use crate::pair_service::PairService;
use crate::parser::TopicRouter;
use crate::pricing::PriceService;
use crate::publisher::{BlockMessage, ResultSink};
use crate::sequencer::Sequencer;
use crate::types::{BlockContext, BlockResult, Event, LogMeta, PairWrap, TxResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

/// Pause between native price lookups while a block waits for its price.
const PRICE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Turns fetched blocks into [`BlockResult`]s.
#[derive(Clone)]
pub struct BlockParser {
    router: Arc<TopicRouter>,
    pairs: Arc<PairService>,
    prices: Arc<PriceService>,
    sequencer: Arc<Sequencer>,
    pool_size: usize,
}

impl BlockParser {
    /// Parser committing through `sequencer` with at most `pool_size` blocks
    /// parsed at once.
    #[must_use]
    pub fn new(
        router: Arc<TopicRouter>,
        pairs: Arc<PairService>,
        prices: Arc<PriceService>,
        sequencer: Arc<Sequencer>,
        pool_size: usize,
    ) -> Self {
        Self {
            router,
            pairs,
            prices,
            sequencer,
            pool_size: pool_size.max(1),
        }
    }

    /// Parse every context read from `input` and commit it to `output` in
    /// height order. Returns once `input` is closed and every parse finished.
    ///
    /// The pool has no stop signal of its own: accepted blocks always finish,
    /// including their price wait. Aborting the task discards in-flight work.
    ///
    /// # Errors
    ///
    /// The task resolves to an error on a sequencing violation.
    pub fn spawn_pool(
        &self,
        input: mpsc::Receiver<BlockContext>,
        output: mpsc::Sender<BlockContext>,
    ) -> JoinHandle<IndexerResult<()>> {
        let parser = self.clone();
        tokio::spawn(async move { parser.run_pool(input, output).await })
    }

    async fn run_pool(
        &self,
        mut input: mpsc::Receiver<BlockContext>,
        output: mpsc::Sender<BlockContext>,
    ) -> IndexerResult<()> {
        let permits = Arc::new(Semaphore::new(self.pool_size));
        let mut tasks = JoinSet::new();
        info!(pool_size = self.pool_size, "Parse pool started");

        while let Some(context) = input.recv().await {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|_| IndexerError::invariant("parse pool semaphore closed"))?;

            let parser = self.clone();
            let output = output.clone();
            tasks.spawn(async move {
                let _permit = permit;
                parser.parse_and_commit(context, &output).await
            });

            while let Some(done) = tasks.try_join_next() {
                flatten_join(done)?;
            }
        }

        while let Some(done) = tasks.join_next().await {
            flatten_join(done)?;
        }
        info!("Parse pool drained");
        Ok(())
    }

    async fn parse_and_commit(
        &self,
        mut context: BlockContext,
        output: &mpsc::Sender<BlockContext>,
    ) -> IndexerResult<()> {
        let started = Instant::now();
        context.native_price = Some(self.wait_for_price(context.number()).await);

        let result = self.parse_block(&mut context).await;
        info!(
            block = result.block_number,
            txs = result.txs.len(),
            events = result.event_count(),
            duration_ms = started.elapsed().as_millis(),
            "Block parsed"
        );
        context.result = Some(result);
        self.sequencer.commit(context, output).await
    }

    async fn wait_for_price(&self, block: u64) -> f64 {
        loop {
            match self.prices.native_token_price(block).await {
                Ok(price) => return price,
                Err(e) => warn!(block, error = %e, "Native price unavailable, retrying"),
            }
            tokio::time::sleep(PRICE_POLL_INTERVAL).await;
        }
    }

    /// Decode every successful receipt of `context` and attach pair context.
    ///
    /// Receipts whose sender cannot be resolved are skipped, so are logs the
    /// router does not understand and events of filtered pairs.
    #[instrument(skip_all, fields(block = context.number()))]
    pub async fn parse_block(&self, context: &mut BlockContext) -> BlockResult {
        let block_number = context.number();
        let block_time = context.timestamp();
        let mut result = BlockResult::new(
            block_number,
            block_time,
            context.native_price.unwrap_or_default(),
        );

        let receipts = std::mem::take(&mut context.receipts);
        for receipt in receipts.iter().filter(|r| r.success) {
            let maker = match context.tx_sender(receipt.tx_index) {
                Ok(maker) => maker,
                Err(e) => {
                    warn!(block = block_number, tx = %receipt.tx_hash, error = %e, "Sender unavailable, receipt skipped");
                    continue;
                }
            };

            let meta = LogMeta {
                tx_hash: receipt.tx_hash,
                tx_index: receipt.tx_index,
                log_index: 0,
                block_number,
                block_time,
            };
            let mut tx = TxResult::new(receipt.tx_hash, receipt.tx_index, maker);

            for log in &receipt.logs {
                let mut event = match self.router.route(log, meta) {
                    None => continue,
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        debug!(block = block_number, log_index = log.log_index, error = %e, "Log skipped");
                        continue;
                    }
                };

                let wrap = match self.pair_for(&event).await {
                    Ok(wrap) => wrap,
                    Err(e) => {
                        error!(block = block_number, pair = %event.pair_address(), error = %e, "Pair resolution failed, event skipped");
                        continue;
                    }
                };
                if wrap.pair.filtered {
                    continue;
                }

                collect_new_entities(&mut result, &wrap);
                event.set_pair(wrap.pair);
                tx.add_event(event);
            }

            tx.link_events();
            result.add_tx_result(tx);
        }
        context.receipts = receipts;
        result
    }

    async fn pair_for(&self, event: &Event) -> IndexerResult<PairWrap> {
        match &event.pair {
            Some(provisional) if event.self_describes_pair() => {
                self.pairs.get_tokens(provisional.clone()).await
            }
            _ => {
                self.pairs
                    .get_pair_and_tokens(event.pair_address(), &event.protocol_ids)
                    .await
            }
        }
    }
}

/// Record the entities a resolution discovered, stamping first-seen block
/// info on tokens.
fn collect_new_entities(result: &mut BlockResult, wrap: &PairWrap) {
    if wrap.new_pair {
        result.add_new_pair(&wrap.pair);
    }
    for token in [&wrap.token0, &wrap.token1].into_iter().flatten() {
        let mut token = token.clone();
        if token.block_number == 0 {
            token.block_number = result.block_number;
            token.block_time = result.block_time;
        }
        result.add_new_token(&token);
    }
}

fn flatten_join(done: Result<IndexerResult<()>, tokio::task::JoinError>) -> IndexerResult<()> {
    done.map_err(|e| IndexerError::invariant(format!("parse task panicked: {e}")))?
}

/// Single consumer of ordered parse output.
///
/// For each block every sink runs in order, then the cache watermark moves
/// to the block. A failing sink stops the handler with a fatal error and the
/// watermark stays at the previous block.
pub struct ResultHandler {
    cache: Arc<dyn Cache>,
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl ResultHandler {
    /// Handler delivering to `sinks` in the given order.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        Self { cache, sinks }
    }

    /// Deliver one block and advance the watermark.
    ///
    /// # Errors
    ///
    /// Returns a [`IndexerError::SinkError`] naming the failing sink, or the
    /// cache error when the watermark cannot be stored.
    #[instrument(skip_all, fields(block = result.block_number, duration_ms = tracing::field::Empty))]
    pub async fn handle(&self, result: &BlockResult) -> IndexerResult<()> {
        let started = Instant::now();
        let message = Arc::new(BlockMessage::from(result));

        for sink in &self.sinks {
            sink.publish(result, &message).await.map_err(|e| {
                IndexerError::sink(
                    format!("{} sink failed at block {}", sink.name(), result.block_number),
                    Some(Box::new(e)),
                )
            })?;
        }
        self.cache.set_finished_block(result.block_number).await?;

        let duration_ms = started.elapsed().as_millis();
        tracing::Span::current().record("duration_ms", duration_ms);
        info!(
            block = result.block_number,
            price = result.native_price,
            txs = result.txs.len(),
            events = result.event_count(),
            new_pairs = result.new_pairs.len(),
            new_tokens = result.new_tokens.len(),
            "Block committed"
        );
        Ok(())
    }

    /// Drain `input` until it closes. Resolves to the last committed height.
    ///
    /// # Errors
    ///
    /// The task resolves to the first sink or cache failure, or an invariant
    /// violation when a context arrives without a parse result.
    pub fn spawn(self, mut input: mpsc::Receiver<BlockContext>) -> JoinHandle<IndexerResult<Option<u64>>> {
        tokio::spawn(async move {
            let mut last = None;
            while let Some(context) = input.recv().await {
                let result = context.result.as_ref().ok_or_else(|| {
                    IndexerError::invariant(format!(
                        "block {} reached the commit stage unparsed",
                        context.number()
                    ))
                })?;
                self.handle(result).await?;
                last = Some(result.block_number);
            }
            info!(last, "Result handler stopped");
            Ok(last)
        })
    }
}
