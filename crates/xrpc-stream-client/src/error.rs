//! Errors surfaced to a subscription consumer (§4.7).
//!
//! The reconnect loop itself never surfaces a retryable transport hiccup —
//! those are swallowed and retried per §4.7 step 7. What reaches the
//! consumer is either a decoded server error frame (`XrpcError`, mirroring
//! the source's `byMessage` throw) or a terminal condition the loop gave
//! up on.

use xrpc_frame::FrameError;

/// The error a subscription's message stream yields for a server-sent
/// Error frame (§4.7 "An Error frame causes `byMessage` to throw an
/// `XRPCError(code=-1, name=frame.error, message=frame.message)`").
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
#[error("{name}{}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct XrpcError {
    /// Always `-1` for a frame-sourced error (§3 "Frame", Error variant).
    pub code: i32,
    pub name: String,
    pub message: Option<String>,
}

impl XrpcError {
    pub fn from_frame(error: String, message: Option<String>) -> Self {
        Self {
            code: -1,
            name: error,
            message,
        }
    }
}

/// Why a subscription's message stream ended or failed.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SubscriptionError {
    /// The server sent an Error frame (non-retryable: the server will
    /// close the socket with a policy code right after).
    #[error(transparent)]
    Server(#[from] XrpcError),

    /// A frame failed to decode.
    #[error("frame decode error: {0}")]
    Frame(#[from] FrameError),

    /// `resolve_url` failed to produce a usable URL for this attempt.
    #[error("could not resolve subscription url: {0}")]
    InvalidUrl(String),

    /// The socket closed with a non-normal, non-retryable code (e.g. a
    /// policy close that wasn't preceded by an Error frame).
    #[error("subscription closed: code={code} reason={reason:?}")]
    Closed { code: u16, reason: String },

    /// The consumer (or an explicit `close()` call) ended the subscription.
    #[error("subscription cancelled")]
    Cancelled,
}
