//! Reordering barrier that restores strict height order.
//!
//! Fetch and parse workers finish blocks in whatever order the network lets
//! them. Each pipeline hop owns a [`Sequencer`]: a worker that finished block
//! `n` calls [`Sequencer::commit`], which suspends it until block `n - 1` has
//! been pushed, then pushes `n` onto the hop's output queue and wakes the
//! other waiters.
//!
//! The "last committed" counter lives in a `tokio::sync::watch` channel, which
//! plays the role of a mutex-guarded counter plus condition variable:
//! waiters re-check the predicate on every change.
//!
//! Sequence numbers must be unique and contiguous. A missing number suspends
//! every higher waiter forever; detecting such gaps is the job of watermark
//! monitoring, not of this type.
//!
//! ```
//! use dex_block_indexer::sequencer::{Sequenced, Sequencer};
//! use tokio::sync::mpsc;
//!
//! struct Item(u64);
//! impl Sequenced for Item {
//!     fn sequence(&self) -> u64 { self.0 }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sequencer = Sequencer::new("example", true);
//! sequencer.init(9)?;
//! let (tx, mut rx) = mpsc::channel(4);
//! sequencer.commit(Item(10), &tx).await?;
//! assert_eq!(rx.recv().await.map(|i| i.0), Some(10));
//! # Ok(())
//! # }
//! ```

use crate::error::{IndexerError, IndexerResult};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Items that carry their position in the sequence.
pub trait Sequenced {
    /// Sequence number (block height).
    fn sequence(&self) -> u64;
}

/// A per-hop ordering barrier.
#[derive(Debug)]
pub struct Sequencer {
    name: &'static str,
    enabled: bool,
    committed: watch::Sender<u64>,
}

impl Sequencer {
    /// Create a sequencer. When `enabled` is false, commits pass through
    /// without ordering.
    #[must_use]
    pub fn new(name: &'static str, enabled: bool) -> Self {
        let (committed, _) = watch::channel(0);
        Self {
            name,
            enabled,
            committed,
        }
    }

    /// Whether commits are ordered.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Last committed sequence number.
    #[must_use]
    pub fn last_committed(&self) -> u64 {
        *self.committed.borrow()
    }

    /// Set the baseline: the next accepted item is `baseline + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::InvariantViolation`] when a non-zero baseline is
    /// already set.
    pub fn init(&self, baseline: u64) -> IndexerResult<()> {
        let current = self.last_committed();
        if current != 0 {
            return Err(IndexerError::invariant(format!(
                "sequencer {} already initialized at {current}",
                self.name
            )));
        }
        self.committed.send_replace(baseline);
        debug!(sequencer = self.name, baseline, "Sequencer initialized");
        Ok(())
    }

    /// Push `item` onto `output` once every lower sequence number has been
    /// pushed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::InvariantViolation`] when the item's number was
    /// already committed or the output queue is closed.
    pub async fn commit<T: Sequenced>(&self, item: T, output: &mpsc::Sender<T>) -> IndexerResult<()> {
        let sequence = item.sequence();

        if !self.enabled {
            return self.push(item, output, sequence).await;
        }

        let last = self.last_committed();
        if sequence <= last {
            return Err(IndexerError::invariant(format!(
                "sequencer {} received {sequence} after committing {last}",
                self.name
            )));
        }

        trace!(sequencer = self.name, sequence, last, "Waiting for turn");
        let mut turn = self.committed.subscribe();
        turn.wait_for(|last| last.saturating_add(1) == sequence)
            .await
            .map_err(|_| {
                IndexerError::invariant(format!("sequencer {} counter dropped", self.name))
            })?;

        self.push(item, output, sequence).await?;
        self.committed.send_replace(sequence);
        trace!(sequencer = self.name, sequence, "Committed");
        Ok(())
    }

    async fn push<T>(&self, item: T, output: &mpsc::Sender<T>, sequence: u64) -> IndexerResult<()> {
        output.send(item).await.map_err(|_| {
            IndexerError::invariant(format!(
                "sequencer {} output queue closed at {sequence}",
                self.name
            ))
        })
    }
}
