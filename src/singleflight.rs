//! Collapse concurrent requests for the same key into one execution.
//!
//! The first caller for a key becomes the leader and runs the closure; every
//! caller that arrives while it runs waits on the same cell and receives a
//! clone of the leader's value. Once the leader finishes the key is removed,
//! so a later call starts a fresh flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// A group of in-flight computations keyed by string.
#[derive(Debug)]
pub struct SingleFlight<V> {
    flights: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> SingleFlight<V> {
    /// Empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a flight is already in progress.
    ///
    /// Returns the value and whether this caller was the leader.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> (V, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut flights = self.flights.lock().await;
            Arc::clone(flights.entry(key.to_string()).or_default())
        };

        let led = AtomicBool::new(false);
        let value = cell
            .get_or_init(|| async {
                led.store(true, Ordering::Release);
                work().await
            })
            .await
            .clone();
        let leader = led.load(Ordering::Acquire);

        if leader {
            let mut flights = self.flights.lock().await;
            if flights.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                flights.remove(key);
            }
        }

        (value, leader)
    }

    /// Number of keys currently in flight.
    pub async fn in_flight(&self) -> usize {
        self.flights.lock().await.len()
    }
}
