//! Reconnect state machine for the head subscription.
//!
//! ```text
//! Connecting ──▶ Connected ──▶ ErrorDetected ──▶ Backoff(delay) ──▶ Reconnecting
//!                    ▲                                                  │
//!                    └──────────────────────────────────────────────────┘
//! ```
//!
//! The backoff delay starts at the initial delay, doubles on every failure
//! and is capped at the maximum. It only resets once a header actually
//! arrives, so an endpoint that accepts connections but never delivers keeps
//! backing off.

use std::time::Duration;

/// Where the subscription currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connection attempt
    Connecting,
    /// Subscribed and reading headers
    Connected,
    /// The stream failed, ended or went idle
    ErrorDetected,
    /// Waiting before the next attempt
    Backoff(Duration),
    /// Attempting to resubscribe
    Reconnecting,
}

/// Deterministic reconnect bookkeeping. Jitter is applied by the caller
/// with [`with_jitter`] so the machine itself stays predictable.
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    state: ConnectionState,
    initial_delay: Duration,
    max_delay: Duration,
    next_delay: Duration,
}

impl ReconnectMachine {
    /// Machine in [`ConnectionState::Connecting`].
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        let max_delay = max_delay.max(initial_delay);
        Self {
            state: ConnectionState::Connecting,
            initial_delay,
            max_delay,
            next_delay: initial_delay,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Delay the next backoff will use.
    #[must_use]
    pub const fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// A subscription was established.
    pub fn on_connected(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            self.state = ConnectionState::Connected;
        }
    }

    /// A header arrived: the connection is healthy again.
    pub fn on_header(&mut self) {
        if self.state == ConnectionState::Connected {
            self.next_delay = self.initial_delay;
        }
    }

    /// The subscription failed in any state.
    pub fn on_error(&mut self) {
        self.state = ConnectionState::ErrorDetected;
    }

    /// Enter backoff and return the delay to wait. Doubles the delay for the
    /// following failure.
    pub fn start_backoff(&mut self) -> Duration {
        let delay = self.next_delay;
        self.state = ConnectionState::Backoff(delay);
        self.next_delay = delay.saturating_mul(2).min(self.max_delay);
        delay
    }

    /// The backoff elapsed; the next step is a new subscription attempt.
    pub fn on_backoff_elapsed(&mut self) {
        if matches!(self.state, ConnectionState::Backoff(_)) {
            self.state = ConnectionState::Reconnecting;
        }
    }
}

/// Spread `delay` by up to ±25% so reconnecting clients do not move in step.
#[must_use]
pub fn with_jitter(delay: Duration) -> Duration {
    let factor = 0.5 * (rand::random::<f64>() - 0.5);
    delay.mul_f64(1.0 + factor)
}
