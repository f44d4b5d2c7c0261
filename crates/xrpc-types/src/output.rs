//! Handler input/output data shapes (§3 "HandlerInput"/"HandlerOutput",
//! §9 "Dynamic dispatch on output shape").

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

use crate::error::XrpcErrorKind;
use crate::params::Params;

/// The decoded request body handed to a handler (§3 "HandlerInput").
#[derive(Debug, Clone)]
pub enum HandlerInput {
    Json(Value),
    Text(String),
    Bytes(Bytes),
    /// The method declares no input at all.
    None,
}

/// A handler's fully resolved output (§3 "HandlerOutput", §9 closed sum):
/// exactly one of success, pipe-through buffer, pipe-through stream, or an
/// error-result.
pub enum HandlerOutput {
    /// No body (`undefined`/`void` in the source).
    Void { headers: HeaderMap },
    /// A JSON (or other declared-encoding) success body.
    Json {
        encoding: String,
        body: Value,
        headers: HeaderMap,
    },
    /// Pipe-through: raw bytes copied to the client verbatim.
    Buffer {
        encoding: String,
        buffer: Bytes,
        headers: HeaderMap,
    },
    /// Pipe-through: a byte stream copied to the client as it is produced.
    Stream {
        encoding: String,
        stream: BoxByteStream,
        headers: HeaderMap,
    },
    /// The handler explicitly produced an error result rather than
    /// returning a value (§9 "error-result carrying an XRPCError directly").
    Error(XrpcErrorKind),
}

pub type BoxByteStream =
    std::pin::Pin<Box<dyn futures_core::Stream<Item = std::io::Result<Bytes>> + Send>>;

pub type HeaderMap = HashMap<String, String>;

impl HandlerOutput {
    pub fn void() -> Self {
        Self::Void {
            headers: HeaderMap::new(),
        }
    }

    pub fn json(body: Value) -> Self {
        Self::Json {
            encoding: "application/json".into(),
            body,
            headers: HeaderMap::new(),
        }
    }

    pub fn error(kind: XrpcErrorKind) -> Self {
        Self::Error(kind)
    }
}

/// A handler-callable hook that clears the calling route's own rate-limit
/// counters (§4.5 "Bypass": "used to reverse a preliminary consumption").
/// Type-erased so this crate doesn't need to depend on the rate-limit
/// store or its async runtime; the dispatcher supplies the real closure.
pub type ResetRouteRateLimits = std::sync::Arc<
    dyn Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// A hook that does nothing, for routes with no route-specific limiters to
/// clear (subscriptions declare no `rate_limiters` list of their own).
pub fn no_op_reset_route_rate_limits() -> ResetRouteRateLimits {
    std::sync::Arc::new(|| Box::pin(async {}))
}

/// The fully assembled per-request context passed to a handler (§4.8
/// "Handler execution"): parsed params, parsed input, verified auth
/// artifacts (opaque to this crate — the auth crate defines the concrete
/// shape), and a route-reset hook.
pub struct RequestContext<A> {
    pub nsid: crate::nsid::Nsid,
    pub params: Params,
    pub input: HandlerInput,
    pub auth: Option<A>,
    pub reset_route_rate_limits: ResetRouteRateLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_output_has_no_body_but_may_carry_headers() {
        let mut out = HandlerOutput::void();
        if let HandlerOutput::Void { headers } = &mut out {
            headers.insert("X-Test".into(), "1".into());
        }
        match out {
            HandlerOutput::Void { headers } => assert_eq!(headers.get("X-Test").unwrap(), "1"),
            _ => panic!("expected void"),
        }
    }
}
