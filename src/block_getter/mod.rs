//! Head tracking and bounded concurrent block fetching.
//!
//! ```text
//!  head loop ──observe──▶ HeadTracker ◀──poll── dispatch ──u64──▶ fetch pool
//!                                                                    │
//!                                              Sequencer ◀──commit───┘
//!                                                  │
//!                                                  ▼
//!                                           BlockContext queue
//! ```
//!
//! The head loop keeps [`HeadTracker`] at the highest height any header
//! reported. Dispatch walks a cursor up to that height and enqueues every
//! number exactly once. The fetch pool reads numbers, fetches body and
//! receipts concurrently and commits each context through the fetch
//! [`Sequencer`], which releases them in height order.
//!
//! A block whose fetch exhausts its retries is logged and dropped. Its
//! height never reaches the sequencer, so every higher block waits behind
//! the gap until the process restarts and resumes from the watermark.

mod reconnect;

pub use reconnect::{with_jitter, ConnectionState, ReconnectMachine};

use crate::cache::Cache;
use crate::error::{IndexerError, IndexerResult};
use crate::rpc::{ChainRpc, HeadStream, HeadSubscriber, RetryPolicy};
use crate::sequencer::Sequencer;
use crate::types::BlockContext;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Dispatch re-checks the head this often while caught up.
const HEAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Highest head height observed so far. Never moves backwards.
#[derive(Debug, Default)]
pub struct HeadTracker {
    head: AtomicU64,
}

impl HeadTracker {
    /// Tracker at height zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reported height. Returns whether the head advanced.
    pub fn observe(&self, height: u64) -> bool {
        self.head.fetch_max(height, Ordering::AcqRel) < height
    }

    /// Highest height observed.
    #[must_use]
    pub fn head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }
}

/// Reconnect and idle settings of the head subscription.
#[derive(Debug, Clone, Copy)]
pub struct HeadSettings {
    /// Resubscribe when no header arrived for this long
    pub idle_timeout: Duration,
    /// First backoff delay
    pub initial_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
}

impl Default for HeadSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Why a subscription stopped being read.
enum StreamEnd {
    Cancelled,
    Failed(IndexerError),
}

/// Head tracking, dispatch and fetching for one chain.
#[derive(Clone)]
pub struct BlockGetter {
    chain: Arc<dyn ChainRpc>,
    head: Arc<HeadTracker>,
    sequencer: Arc<Sequencer>,
    fetch_retry: RetryPolicy,
    pool_size: usize,
}

impl BlockGetter {
    /// Getter committing fetched blocks through `sequencer` with at most
    /// `pool_size` fetches in flight.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainRpc>,
        sequencer: Arc<Sequencer>,
        fetch_retry: RetryPolicy,
        pool_size: usize,
    ) -> Self {
        Self {
            chain,
            head: Arc::new(HeadTracker::new()),
            sequencer,
            fetch_retry,
            pool_size: pool_size.max(1),
        }
    }

    /// Shared handle on the observed head.
    #[must_use]
    pub fn head_tracker(&self) -> Arc<HeadTracker> {
        Arc::clone(&self.head)
    }

    /// Height to start from: `configured` if set, else the cached finished
    /// block watermark, else the chain head.
    ///
    /// A watermark resumes at the watermark block itself, so the last
    /// finished block is processed again after a restart.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when every source yields zero, and
    /// propagates cache or RPC failures.
    #[instrument(skip(self, cache), fields(source = tracing::field::Empty))]
    pub async fn resolve_start_height(
        &self,
        configured: Option<u64>,
        cache: &dyn Cache,
    ) -> IndexerResult<u64> {
        let (height, source) = if let Some(height) = configured.filter(|h| *h > 0) {
            (height, "config")
        } else if let Some(height) = cache.get_finished_block().await?.filter(|h| *h > 0) {
            (height, "watermark")
        } else {
            let head = self
                .fetch_retry
                .run("block_number", || self.chain.block_number())
                .await?;
            (head, "chain_head")
        };
        tracing::Span::current().record("source", source);

        if height == 0 {
            return Err(IndexerError::config(
                "start height resolved to zero; set START_BLOCK",
                None,
            ));
        }
        info!(height, source, "Start height resolved");
        Ok(height)
    }

    /// Keep the head tracker current until `shutdown` fires.
    ///
    /// Seeds the tracker from `eth_blockNumber`, then follows `subscriber`,
    /// resubscribing with capped exponential backoff whenever the stream
    /// fails, ends or stays silent for `settings.idle_timeout`.
    pub fn spawn_head_loop(
        &self,
        subscriber: Arc<dyn HeadSubscriber>,
        settings: HeadSettings,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let getter = self.clone();
        tokio::spawn(async move { getter.run_head_loop(subscriber, settings, shutdown).await })
    }

    async fn run_head_loop(
        &self,
        subscriber: Arc<dyn HeadSubscriber>,
        settings: HeadSettings,
        shutdown: CancellationToken,
    ) {
        match self.chain.block_number().await {
            Ok(height) => {
                self.head.observe(height);
                info!(head = height, "Head seeded from chain");
            }
            Err(e) => warn!(error = %e, "Failed to seed head height, waiting for subscription"),
        }

        let mut machine = ReconnectMachine::new(settings.initial_delay, settings.max_delay);
        loop {
            let subscribed = tokio::select! {
                () = shutdown.cancelled() => break,
                subscribed = subscriber.subscribe() => subscribed,
            };

            match subscribed {
                Ok(mut stream) => {
                    machine.on_connected();
                    info!(head = self.head.head(), "Head subscription established");
                    match self
                        .follow(&mut stream, &mut machine, settings.idle_timeout, &shutdown)
                        .await
                    {
                        StreamEnd::Cancelled => break,
                        StreamEnd::Failed(e) => warn!(error = %e, "Head subscription lost"),
                    }
                }
                Err(e) => warn!(error = %e, "Head subscription failed"),
            }

            machine.on_error();
            let delay = with_jitter(machine.start_backoff());
            info!(delay_ms = delay.as_millis(), "Resubscribing to heads after backoff");
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            machine.on_backoff_elapsed();
        }
        info!(head = self.head.head(), "Head loop stopped");
    }

    async fn follow(
        &self,
        stream: &mut HeadStream,
        machine: &mut ReconnectMachine,
        idle_timeout: Duration,
        shutdown: &CancellationToken,
    ) -> StreamEnd {
        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => return StreamEnd::Cancelled,
                next = tokio::time::timeout(idle_timeout, stream.next()) => next,
            };

            match next {
                Ok(Some(Ok(height))) => {
                    machine.on_header();
                    if self.head.observe(height) {
                        debug!(head = height, "New head");
                    }
                }
                Ok(Some(Err(e))) => return StreamEnd::Failed(e),
                Ok(None) => {
                    return StreamEnd::Failed(IndexerError::websocket_disconnected(
                        "head stream ended",
                    ))
                }
                Err(_) => {
                    return StreamEnd::Failed(IndexerError::websocket_disconnected(format!(
                        "no header for {}s",
                        idle_timeout.as_secs()
                    )))
                }
            }
        }
    }

    /// Enqueue every height from `start` onwards exactly once, following the
    /// tracked head. Stops after `end` when given, when `shutdown` fires, or
    /// when the queue's receiver is gone. Dropping the sender on exit closes
    /// the queue.
    pub fn spawn_dispatch(
        &self,
        start: u64,
        end: Option<u64>,
        queue: mpsc::Sender<u64>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let head = self.head_tracker();
        tokio::spawn(async move {
            let next = dispatch(&head, start, end, &queue, &shutdown).await;
            info!(next, "Dispatch stopped");
        })
    }

    /// Fetch every height read from `input` with at most `pool_size` fetches
    /// in flight, committing the contexts to `output` in height order.
    ///
    /// Returns once `input` is closed and every fetch has finished; `output`
    /// is closed when the returned task completes.
    ///
    /// # Errors
    ///
    /// The task resolves to an error when a commit violates sequencing or the
    /// output queue is closed underneath it.
    pub fn spawn_fetch_pool(
        &self,
        input: mpsc::Receiver<u64>,
        output: mpsc::Sender<BlockContext>,
    ) -> JoinHandle<IndexerResult<()>> {
        let getter = self.clone();
        tokio::spawn(async move { getter.run_fetch_pool(input, output).await })
    }

    async fn run_fetch_pool(
        &self,
        mut input: mpsc::Receiver<u64>,
        output: mpsc::Sender<BlockContext>,
    ) -> IndexerResult<()> {
        let permits = Arc::new(Semaphore::new(self.pool_size));
        let mut tasks = JoinSet::new();
        info!(pool_size = self.pool_size, "Fetch pool started");

        while let Some(number) = input.recv().await {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|_| IndexerError::invariant("fetch pool semaphore closed"))?;

            let getter = self.clone();
            let output = output.clone();
            tasks.spawn(async move {
                let _permit = permit;
                getter.fetch_and_commit(number, &output).await
            });

            while let Some(done) = tasks.try_join_next() {
                flatten_join(done)?;
            }
        }

        while let Some(done) = tasks.join_next().await {
            flatten_join(done)?;
        }
        info!("Fetch pool drained");
        Ok(())
    }

    async fn fetch_and_commit(
        &self,
        number: u64,
        output: &mpsc::Sender<BlockContext>,
    ) -> IndexerResult<()> {
        let started = Instant::now();
        let context = match self
            .fetch_retry
            .run("fetch_block", || self.fetch_block(number))
            .await
        {
            Ok(context) => context,
            Err(e) => {
                error!(block = number, error = %e, "Block fetch failed after retries, dropping block");
                return Ok(());
            }
        };

        debug!(
            block = number,
            transactions = context.block.transactions.len(),
            receipts = context.receipts.len(),
            duration_ms = started.elapsed().as_millis(),
            "Block fetched"
        );
        self.sequencer.commit(context, output).await
    }

    /// Fetch the body and receipts of block `number` concurrently.
    ///
    /// # Errors
    ///
    /// Returns an RPC error when either call fails or the node does not have
    /// the block yet.
    pub async fn fetch_block(&self, number: u64) -> IndexerResult<BlockContext> {
        let (block, receipts) = tokio::try_join!(
            self.chain.block_by_number(number),
            self.chain.block_receipts(number)
        )?;
        let block =
            block.ok_or_else(|| IndexerError::rpc(format!("block {number} not found"), None))?;
        Ok(BlockContext::new(block, receipts))
    }
}

/// Walk the cursor up to the tracked head. Returns the next undispatched
/// height.
async fn dispatch(
    head: &HeadTracker,
    start: u64,
    end: Option<u64>,
    queue: &mpsc::Sender<u64>,
    shutdown: &CancellationToken,
) -> u64 {
    let mut cursor = start;
    info!(start, end, "Dispatch started");

    loop {
        if end.is_some_and(|end| cursor > end) {
            return cursor;
        }

        let last = end.map_or(head.head(), |end| end.min(head.head()));
        if last < cursor {
            tokio::select! {
                () = shutdown.cancelled() => return cursor,
                () = tokio::time::sleep(HEAD_POLL_INTERVAL) => continue,
            }
        }

        while cursor <= last {
            if shutdown.is_cancelled() {
                return cursor;
            }
            tokio::select! {
                () = shutdown.cancelled() => return cursor,
                sent = queue.send(cursor) => {
                    if sent.is_err() {
                        warn!(next = cursor, "Fetch queue closed, dispatch exiting");
                        return cursor;
                    }
                }
            }
            cursor += 1;
        }
    }
}

fn flatten_join(done: Result<IndexerResult<()>, tokio::task::JoinError>) -> IndexerResult<()> {
    done.map_err(|e| IndexerError::invariant(format!("fetch task panicked: {e}")))?
}
