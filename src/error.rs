//! Error types for the DEX block indexer.
//!
//! This module provides a unified error type [`IndexerError`] that covers every
//! failure the pipeline can observe, from configuration loading through block
//! fetching, event decoding, pair resolution and the final commit to sinks.
//!
//! # Design
//!
//! The error hierarchy is organized by layer:
//! - [`IndexerError::ConfigError`]: Configuration and environment issues
//! - [`IndexerError::RpcError`]: RPC provider and network errors
//! - [`IndexerError::DecodingError`]: Log and call-return decoding errors
//! - [`IndexerError::StateError`]: Cache and pipeline state errors
//! - [`IndexerError::MathError`]: Arithmetic and price calculation errors
//! - [`IndexerError::DatabaseError`]: SQLite persistence errors
//! - [`IndexerError::SinkError`]: Failures publishing a block result downstream
//! - [`IndexerError::InvariantViolation`]: Construction bugs (fatal)
//!
//! Whether a failed RPC call is worth retrying is decided by
//! [`is_retryable_error`], which the retry policies consult before sleeping.
//!
//! # Example
//!
//! ```
//! use dex_block_indexer::error::{IndexerError, IndexerResult};
//!
//! fn validate_pool_size(size: usize) -> IndexerResult<()> {
//!     if size == 0 {
//!         return Err(IndexerError::config("pool size cannot be zero", None));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Result type alias using [`IndexerError`].
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Boxed source error carried by most variants.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the indexer pipeline.
#[derive(Debug)]
pub enum IndexerError {
    /// Configuration or environment variable errors.
    ConfigError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// RPC provider or network errors.
    ///
    /// Variants include:
    /// - Failed to connect to provider
    /// - Block or receipts not found
    /// - Reverted contract calls
    RpcError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Log or call-return decoding errors.
    DecodingError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Cache or pipeline state errors.
    StateError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Arithmetic or calculation errors.
    MathError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Database operation errors.
    ///
    /// Variants include:
    /// - Connection failures
    /// - Query execution errors
    /// - Migration failures
    DatabaseError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// WebSocket connection errors.
    WebSocketConnectionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// WebSocket subscription errors.
    WebSocketSubscriptionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// The head subscription stream ended or went idle.
    WebSocketDisconnected {
        /// Human-readable error message
        message: String,
    },

    /// An operation exceeded its overall time budget.
    TimeoutError {
        /// Human-readable error message
        message: String,
    },

    /// Publishing a block result to a downstream sink failed.
    ///
    /// Sink failures are fatal: the watermark must never advance past a block
    /// whose result was not delivered.
    SinkError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// A programming or construction invariant was broken.
    ///
    /// Examples: initializing a sequencer baseline twice, committing into a
    /// closed queue. Always fatal.
    InvariantViolation {
        /// Human-readable error message
        message: String,
    },
}

impl IndexerError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use dex_block_indexer::error::IndexerError;
    ///
    /// let err = IndexerError::config("FETCH_POOL_SIZE must be > 0", None);
    /// assert!(matches!(err, IndexerError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new RPC error.
    ///
    /// # Example
    ///
    /// ```
    /// use dex_block_indexer::error::IndexerError;
    ///
    /// let err = IndexerError::rpc("Failed to connect to provider", None);
    /// assert!(matches!(err, IndexerError::RpcError { .. }));
    /// ```
    #[must_use]
    pub fn rpc(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::RpcError {
            message: message.into(),
            source,
        }
    }

    /// Create a new decoding error.
    #[must_use]
    pub fn decoding(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::DecodingError {
            message: message.into(),
            source,
        }
    }

    /// Create a new state error.
    #[must_use]
    pub fn state(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::StateError {
            message: message.into(),
            source,
        }
    }

    /// Create a new math error.
    ///
    /// # Example
    ///
    /// ```
    /// use dex_block_indexer::error::IndexerError;
    ///
    /// let err = IndexerError::math("Division by zero", None);
    /// assert!(matches!(err, IndexerError::MathError { .. }));
    /// ```
    #[must_use]
    pub fn math(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::MathError {
            message: message.into(),
            source,
        }
    }

    /// Create a new database error.
    #[must_use]
    pub fn database(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket connection error.
    #[must_use]
    pub fn websocket_connection(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::WebSocketConnectionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket subscription error.
    #[must_use]
    pub fn websocket_subscription(
        message: impl Into<String>,
        source: Option<BoxedSource>,
    ) -> Self {
        Self::WebSocketSubscriptionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket disconnection error.
    #[must_use]
    pub fn websocket_disconnected(message: impl Into<String>) -> Self {
        Self::WebSocketDisconnected {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::TimeoutError {
            message: message.into(),
        }
    }

    /// Create a new sink error.
    #[must_use]
    pub fn sink(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::SinkError {
            message: message.into(),
            source,
        }
    }

    /// Create a new invariant violation.
    ///
    /// # Example
    ///
    /// ```
    /// use dex_block_indexer::error::IndexerError;
    ///
    /// let err = IndexerError::invariant("sequencer initialized twice");
    /// assert!(err.is_fatal());
    /// ```
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Whether this error must terminate the process.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::SinkError { .. }
        )
    }

    /// Render the error together with its full source chain.
    #[must_use]
    pub fn chain_string(&self) -> String {
        let mut rendered = self.to_string();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            current = cause.source();
        }
        rendered
    }
}

/// Error message fragments a node returns for calls that will never succeed.
const PERMANENT_CALL_FAILURES: [&str; 4] = [
    "execution reverted",
    "out of gas",
    "invalid opcode",
    "abi: cannot marshal",
];

/// Decide whether an operation that failed with `err` should be retried.
///
/// Decoding failures, configuration and invariant errors never succeed on a
/// second attempt, and neither do reverted or out-of-gas calls. Transport
/// failures, timeouts and everything else are treated as transient.
///
/// # Example
///
/// ```
/// use dex_block_indexer::error::{is_retryable_error, IndexerError};
///
/// assert!(is_retryable_error(&IndexerError::rpc("connection reset", None)));
/// assert!(!is_retryable_error(&IndexerError::rpc("execution reverted", None)));
/// ```
#[must_use]
pub fn is_retryable_error(err: &IndexerError) -> bool {
    match err {
        IndexerError::DecodingError { .. }
        | IndexerError::ConfigError { .. }
        | IndexerError::InvariantViolation { .. } => false,
        _ => {
            let rendered = err.chain_string().to_lowercase();
            !PERMANENT_CALL_FAILURES
                .iter()
                .any(|fragment| rendered.contains(fragment))
        }
    }
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::RpcError { message, .. } => write!(f, "RPC error: {message}"),
            Self::DecodingError { message, .. } => write!(f, "Decoding error: {message}"),
            Self::StateError { message, .. } => write!(f, "State error: {message}"),
            Self::MathError { message, .. } => write!(f, "Math error: {message}"),
            Self::DatabaseError { message, .. } => write!(f, "Database error: {message}"),
            Self::WebSocketConnectionError { message, .. } => {
                write!(f, "WebSocket connection error: {message}")
            }
            Self::WebSocketSubscriptionError { message, .. } => {
                write!(f, "WebSocket subscription error: {message}")
            }
            Self::WebSocketDisconnected { message } => {
                write!(f, "WebSocket disconnected: {message}")
            }
            Self::TimeoutError { message } => write!(f, "Timeout: {message}"),
            Self::SinkError { message, .. } => write!(f, "Sink error: {message}"),
            Self::InvariantViolation { message } => {
                write!(f, "Invariant violation: {message}")
            }
        }
    }
}

impl std::error::Error for IndexerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::RpcError { source, .. }
            | Self::DecodingError { source, .. }
            | Self::StateError { source, .. }
            | Self::MathError { source, .. }
            | Self::DatabaseError { source, .. }
            | Self::WebSocketConnectionError { source, .. }
            | Self::WebSocketSubscriptionError { source, .. }
            | Self::SinkError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::WebSocketDisconnected { .. }
            | Self::TimeoutError { .. }
            | Self::InvariantViolation { .. } => None,
        }
    }
}

/// Convert from `eyre::Report` to `IndexerError`.
///
/// Reports that don't fit a specific category are treated as RPC errors.
impl From<eyre::Report> for IndexerError {
    fn from(err: eyre::Report) -> Self {
        Self::RpcError {
            message: err.to_string(),
            source: None,
        }
    }
}
