//! The extension's end of the native link
//!
//! [`ExtensionPort`] keeps the browser side attached to the broker: it
//! connects through a caller-supplied connector, feeds every inbound
//! command to the [`Dispatcher`], writes replies back with the same
//! correlation ID, and answers broker pings. On disconnect it reconnects
//! with exponential backoff (base 1 s, doubled per attempt, capped at five
//! attempts); the failure counter resets on the first successful inbound
//! message, which proves the link is live rather than merely open.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::browser::api::BrowserApi;
use crate::browser::background::Dispatcher;
use crate::codec::{FrameCodec, FrameDialect};
use crate::error::{AgentfoxError, Result};
use crate::protocol::IpcEnvelope;

/// Base reconnect delay.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Reconnect attempts before the port gives up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// Maintains the native link and pumps commands into the dispatcher.
pub struct ExtensionPort<B: BrowserApi> {
    dispatcher: Arc<Dispatcher<B>>,
    base_delay: Duration,
    max_attempts: u32,
}

impl<B: BrowserApi + 'static> ExtensionPort<B> {
    pub fn new(dispatcher: Arc<Dispatcher<B>>) -> Self {
        Self {
            dispatcher,
            base_delay: RECONNECT_BASE_DELAY,
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }

    /// Override the backoff parameters (tests use tiny ones).
    pub fn with_backoff(mut self, base_delay: Duration, max_attempts: u32) -> Self {
        self.base_delay = base_delay;
        self.max_attempts = max_attempts;
        self
    }

    /// Run the connect/serve/reconnect loop until the attempt budget is
    /// spent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentfoxError::ExtensionDisconnected`] once the capped
    /// backoff is exhausted without a live link.
    pub async fn run<F, Fut, S>(&self, mut connect: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::io::Result<S>>,
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut failures: u32 = 0;
        loop {
            match connect().await {
                Ok(stream) => {
                    let received_any = self.serve(stream).await;
                    if received_any {
                        // The link proved live; start the next outage from a
                        // clean slate.
                        failures = 0;
                    }
                    tracing::info!("native link lost");
                }
                Err(e) => {
                    tracing::warn!("native link connect failed: {}", e);
                }
            }

            failures += 1;
            if failures >= self.max_attempts {
                return Err(AgentfoxError::ExtensionDisconnected.into());
            }
            let delay = self.base_delay * 2u32.saturating_pow(failures - 1);
            tracing::debug!("reconnecting in {:?} (attempt {})", delay, failures + 1);
            tokio::time::sleep(delay).await;
        }
    }

    /// Serve one connection until it drops. Returns whether any inbound
    /// message arrived.
    async fn serve<S>(&self, stream: S) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut read_half, mut write_half) = tokio::io::split(stream);
        let mut decoder = FrameCodec::new(FrameDialect::Ipc);
        let encoder = FrameCodec::new(FrameDialect::Ipc);
        let mut chunk = vec![0u8; 64 * 1024];
        let mut received_any = false;

        loop {
            let n = match read_half.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("native link read failed: {}", e);
                    break;
                }
            };
            let messages = match decoder.push(&chunk[..n]) {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!("native link framing error: {}", e);
                    break;
                }
            };
            for message in messages {
                received_any = true;
                if let Some(reply) = self.handle_message(message).await {
                    match encoder.encode_frame(&reply) {
                        Ok(frame) => {
                            if write_half.write_all(&frame).await.is_err() {
                                return received_any;
                            }
                        }
                        Err(e) => tracing::warn!("cannot encode reply: {}", e),
                    }
                }
            }
        }
        received_any
    }

    /// Dispatch one inbound frame; the returned value, if any, is written
    /// back.
    async fn handle_message(&self, message: Value) -> Option<Value> {
        match message.get("type").and_then(Value::as_str) {
            Some("ping") => Some(serde_json::json!({"type": "pong"})),
            Some("pong") => None,
            Some("command") => {
                // Strip the envelope tag; the dispatcher validates the rest.
                let mut inner = message;
                if let Some(map) = inner.as_object_mut() {
                    map.remove("type");
                }
                let response = self.dispatcher.handle(&inner).await?;
                serde_json::to_value(IpcEnvelope::Response(response)).ok()
            }
            _ => {
                tracing::warn!("dropping unrecognized frame: {}", message);
                None
            }
        }
    }
}
