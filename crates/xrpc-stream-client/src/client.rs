//! The reconnecting subscription consumer (C7, §4.7).
//!
//! Each call to [`subscribe`] spawns a task running the keep-alive loop
//! and returns a [`Subscription`] — an async stream of validated
//! messages. The loop is transparent about retryable hiccups (network
//! errors, idle heartbeats, abnormal closes): the consumer only ever
//! observes validated messages, a server-sent [`XrpcError`], or the
//! stream ending.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;
use xrpc_types::Nsid;

use crate::backoff::reconnect_wait;
use crate::error::{SubscriptionError, XrpcError};
use crate::transport::is_reconnectable;
use crate::type_tag;
use xrpc_frame::Frame;

/// Keep-alive tuning (§4.7 step 4, step 1).
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// How often to ping when idle. Default 10s (§4.7 step 4).
    pub heartbeat_interval: Duration,
    /// Ceiling for the reconnect backoff (§4.7 step 1).
    pub max_reconnect_ms: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            max_reconnect_ms: 60_000,
        }
    }
}

/// A validated message produced from a subscription frame, with `$type`
/// reconstructed from the frame's `t` and the subscription NSID.
pub type ValidatedMessage = Value;

/// A live subscription: an async stream of validated messages, plus a
/// handle to end it.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T, SubscriptionError>>,
    cancel: CancellationToken,
}

impl<T> Subscription<T> {
    /// Request a clean shutdown (§5 "client side honors a user-provided
    /// abort signal by closing the socket and terminating the iterator").
    /// The socket closes with the Normal (1000) code.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, SubscriptionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Subscribe to `nsid` at a URL produced by `resolve_url` (re-invoked on
/// every reconnect attempt so query parameters — e.g. a resumption
/// cursor — can be recomputed, §4.7 step 2), validating each decoded
/// message with `validate`. A `None` from `validate` skips that message.
pub fn subscribe<F, V, T>(
    nsid: Nsid,
    resolve_url: F,
    validate: V,
    config: KeepAliveConfig,
) -> Subscription<T>
where
    F: Fn(u32) -> Result<Url, String> + Send + 'static,
    V: Fn(ValidatedMessage) -> Option<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    tokio::spawn(run(nsid, resolve_url, validate, config, tx, task_cancel));
    Subscription { rx, cancel }
}

async fn run<F, V, T>(
    nsid: Nsid,
    resolve_url: F,
    validate: V,
    config: KeepAliveConfig,
    tx: mpsc::Sender<Result<T, SubscriptionError>>,
    cancel: CancellationToken,
) where
    F: Fn(u32) -> Result<Url, String>,
    V: Fn(ValidatedMessage) -> Option<T>,
{
    let mut attempt: u32 = 0;

    'reconnect: loop {
        let wait = reconnect_wait(attempt, config.max_reconnect_ms);
        if !wait.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return,
            }
        }

        let url = match resolve_url(attempt) {
            Ok(u) => u,
            Err(e) => {
                let _ = tx.send(Err(SubscriptionError::InvalidUrl(e))).await;
                return;
            }
        };

        let connected = tokio_tungstenite::connect_async(url.as_str()).await;
        let ws_stream = match connected {
            Ok((stream, _response)) => stream,
            Err(err) => {
                if is_reconnectable(&err) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(nsid = %nsid, attempt, error = %err, "connect failed, retrying");
                    attempt += 1;
                    continue 'reconnect;
                }
                let _ = tx
                    .send(Err(SubscriptionError::Closed {
                        code: 0,
                        reason: err.to_string(),
                    }))
                    .await;
                return;
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(nsid = %nsid, "subscription connected");
        attempt = 0;

        let (mut write, mut read) = ws_stream.split();
        let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
        heartbeat.tick().await; // first tick fires immediately; consume it
        let mut pong_seen_since_last_ping = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.close().await;
                    return;
                }
                _ = heartbeat.tick() => {
                    if !pong_seen_since_last_ping {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(nsid = %nsid, "heartbeat timeout, reconnecting");
                        let _ = write.close().await;
                        attempt += 1;
                        continue 'reconnect;
                    }
                    pong_seen_since_last_ping = false;
                    if write.send(Message::Ping(bytes::Bytes::new())).await.is_err() {
                        attempt += 1;
                        continue 'reconnect;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Pong(_))) => {
                            pong_seen_since_last_ping = true;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if !deliver_frame(&nsid, &bytes, &validate, &tx).await {
                                return;
                            }
                        }
                        Some(Ok(Message::Close(Some(frame)))) => {
                            if u16::from(frame.code) == 1000 {
                                return;
                            }
                            let _ = tx
                                .send(Err(SubscriptionError::Closed {
                                    code: frame.code.into(),
                                    reason: frame.reason.to_string(),
                                }))
                                .await;
                            return;
                        }
                        Some(Ok(Message::Close(None))) => return,
                        Some(Ok(Message::Text(_) | Message::Frame(_))) => {
                            // the subscription protocol never sends text frames
                        }
                        Some(Err(err)) => {
                            if is_reconnectable(&err) {
                                attempt += 1;
                                continue 'reconnect;
                            }
                            let _ = tx
                                .send(Err(SubscriptionError::Closed {
                                    code: 1006,
                                    reason: err.to_string(),
                                }))
                                .await;
                            return;
                        }
                        None => {
                            // socket ended with no close frame: abnormal
                            // close (1006), retryable (§4.7 step 5, step 7).
                            attempt += 1;
                            continue 'reconnect;
                        }
                    }
                }
            }
        }
    }
}

/// Decode one binary message into a [`Frame`], convert it to a validated
/// message or a server error, and forward it. Returns `false` if the
/// receiver has gone away (caller should stop the task) or the frame was
/// a terminal server error.
async fn deliver_frame<V, T>(
    nsid: &Nsid,
    bytes: &[u8],
    validate: &V,
    tx: &mpsc::Sender<Result<T, SubscriptionError>>,
) -> bool
where
    V: Fn(ValidatedMessage) -> Option<T>,
{
    let frame = match Frame::decode(bytes) {
        Ok(f) => f,
        Err(e) => return tx.send(Err(SubscriptionError::Frame(e))).await.is_ok(),
    };

    match frame {
        Frame::Message { t, body } => {
            let tagged = type_tag::apply(nsid.as_str(), t.as_deref(), body);
            match validate(tagged) {
                Some(value) => tx.send(Ok(value)).await.is_ok(),
                None => true,
            }
        }
        Frame::Error(err_body) => {
            let err = XrpcError::from_frame(err_body.error, err_body.message);
            let _ = tx.send(Err(SubscriptionError::Server(err))).await;
            // the server closes with a policy code right behind this; keep
            // reading rather than returning immediately so that close
            // frame is consumed and doesn't race the next connect attempt
            true
        }
    }
}
