//! Reconnecting WebSocket subscription client (C7, §4.7).
//!
//! Wraps a keep-alive loop around [`tokio_tungstenite`]: exponential
//! backoff with jitter on reconnect, ping/pong heartbeat, retryable vs.
//! terminal error classification, and [`xrpc_frame`]-based frame parsing
//! with `$type` reconstruction against the subscription's NSID.

mod backoff;
mod client;
mod error;
mod transport;
mod type_tag;

pub use backoff::{exponential as backoff_delay, reconnect_wait};
pub use client::{subscribe, KeepAliveConfig, Subscription, ValidatedMessage};
pub use error::{SubscriptionError, XrpcError};
