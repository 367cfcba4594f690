//! WebSocket head subscription.
//!
//! Each call to [`HeadSubscriber::subscribe`] opens a new connection and
//! subscribes to new block headers. Only the height is forwarded: block
//! bodies are always fetched over HTTP so a missed notification never loses
//! data, the dispatcher simply catches up on the next one.
//!
//! Reconnection policy is not handled here. The head loop in
//! [`crate::block_getter`] drives backoff through its reconnect state machine
//! and calls `subscribe` again.

use super::http::redact_url;
use super::{HeadStream, HeadSubscriber};
use crate::error::{IndexerError, IndexerResult};
use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use tracing::{error, info, instrument};

/// [`HeadSubscriber`] backed by an `eth_subscribe("newHeads")` stream.
#[derive(Debug, Clone)]
pub struct WsHeadSubscriber {
    url: String,
}

impl WsHeadSubscriber {
    /// Subscriber for the endpoint at `ws_url`.
    #[must_use]
    pub const fn new(ws_url: String) -> Self {
        Self { url: ws_url }
    }

    /// The WebSocket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HeadSubscriber for WsHeadSubscriber {
    #[instrument(skip(self), fields(ws_host = tracing::field::Empty, duration_ms = tracing::field::Empty))]
    async fn subscribe(&self) -> IndexerResult<HeadStream> {
        let host = redact_url(&self.url);
        tracing::Span::current().record("ws_host", host);
        info!(ws_host = host, "Connecting to WebSocket");

        let start = std::time::Instant::now();
        let provider = ProviderBuilder::new()
            .on_builtin(&self.url)
            .await
            .map_err(|e| {
                error!(error = %e, ws_host = host, "WebSocket connection failed");
                IndexerError::websocket_connection(
                    format!("Failed to connect to {host}"),
                    Some(Box::new(e)),
                )
            })?;

        let subscription = provider.subscribe_blocks().await.map_err(|e| {
            error!(error = %e, "Block subscription failed");
            IndexerError::websocket_subscription("newHeads subscription failed", Some(Box::new(e)))
        })?;

        tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
        info!(ws_host = host, "Head subscription active");

        // The provider owns the connection, so it travels with the stream.
        let stream = subscription
            .into_stream()
            .map(move |header| {
                let _connection = &provider;
                Ok(header.number)
            })
            .boxed();

        Ok(stream)
    }
}
