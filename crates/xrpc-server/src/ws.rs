//! WebSocket upgrade glue and the per-connection producer/frame-sender
//! state machine (§4.6, §9 "async generator to channel + token").
//!
//! The `axum::extract::ws::WebSocketUpgrade` pattern (builder methods,
//! `on_upgrade` spawning a task, `Message`/close-code shapes) is grounded
//! on axum's own extractor; this module never constructs a 101 response
//! directly, it only drives `WebSocketUpgrade` the way that extractor is
//! meant to be driven.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use xrpc_frame::Frame;
use xrpc_types::XrpcErrorKind;

use crate::method::StreamItem;

/// Named close codes this engine actually produces (§6 "Close codes").
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const ABNORMAL: u16 = 1006;
    pub const POLICY: u16 = 1008;
}

/// Rewrite a plain JSON value's `$type` against the subscription's NSID
/// into a frame `t` (§4.6): a `$type` of `"<nsid>#name"` or `"#name"`
/// whose prefix matches the subscription becomes `t = "#name"`; anything
/// else is passed through with `$type` used as the frame's `t` verbatim.
/// Either way `$type` is removed from the body — no mutation of body
/// shape beyond that removal. A non-map or non-string `$type` yields a
/// frame with no `t` at all and an untouched body.
pub fn rewrite_type(subscription_nsid: &str, mut value: Value) -> (Option<String>, Value) {
    let Some(obj) = value.as_object_mut() else {
        return (None, value);
    };
    let Some(Value::String(type_str)) = obj.get("$type").cloned() else {
        return (None, value);
    };
    obj.remove("$type");

    let expected_prefix = format!("{subscription_nsid}#");
    if let Some(name) = type_str.strip_prefix(&expected_prefix) {
        (Some(format!("#{name}")), value)
    } else {
        (Some(type_str), value)
    }
}

/// Build the frame for one producer-yielded item, applying `$type`
/// rewriting to plain values (§4.6).
fn build_frame(subscription_nsid: &str, item: StreamItem) -> Frame {
    match item {
        StreamItem::Frame(frame) => frame,
        StreamItem::Value(value) => {
            let (t, body) = rewrite_type(subscription_nsid, value);
            Frame::message(t, body)
        }
    }
}

/// Drive one accepted WebSocket connection: pull items from `body` until
/// it ends, errors, or `cancel` fires, sending one binary frame per item
/// (§4.6, §9).
///
/// - A clean end of the producer closes with 1000.
/// - A producer error yields exactly one `Error` frame, then closes 1008.
/// - `cancel` firing (client disconnect) stops pulling and drops the
///   connection without a further close frame; the caller is expected to
///   have already torn down the socket in that case.
pub async fn run_producer(
    mut socket: WebSocket,
    subscription_nsid: String,
    mut body: crate::method::StreamBody,
    cancel: CancellationToken,
) {
    use futures_util::StreamExt;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            item = body.next() => item,
        };

        let Some(item) = next else {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::NORMAL,
                    reason: "".into(),
                })))
                .await;
            break;
        };

        match item {
            Ok(item) => {
                let frame = build_frame(&subscription_nsid, item);
                match frame.encode() {
                    Ok(bytes) => {
                        if socket.send(Message::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        #[cfg(feature = "tracing")]
                        tracing::error!(nsid = %subscription_nsid, error = %err, "frame encode failed");
                        break;
                    }
                }
            }
            Err(kind) => {
                send_error_then_close(&mut socket, &kind).await;
                break;
            }
        }
    }
}

async fn send_error_then_close(socket: &mut WebSocket, kind: &XrpcErrorKind) {
    let frame = Frame::error(kind.wire_name(), Some(kind.wire_message()));
    if let Ok(bytes) = frame.encode() {
        let _ = socket.send(Message::Binary(bytes.into())).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: kind.wire_name().to_string().into(),
        })))
        .await;
}
