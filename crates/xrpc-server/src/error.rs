//! Converting the error taxonomy into axum responses (§4.8 "Error
//! taxonomy"): one small wrapper type whose `IntoResponse` impl picks the
//! fixed status and wire body, with a side-channel `tracing::error!` for
//! anything a 500 would otherwise hide.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::HeaderValue;

use xrpc_types::{Nsid, XrpcErrorKind};

/// Render an [`XrpcErrorKind`] as its taxonomy-defined response (§4.8
/// table, §6 "Error response body"). `nsid` is only used for the internal
/// log line on 500s; it is never sent on the wire.
pub fn error_response(kind: XrpcErrorKind, nsid: Option<&Nsid>) -> Response {
    if let XrpcErrorKind::InternalServerError { detail } = &kind {
        #[cfg(feature = "tracing")]
        tracing::error!(nsid = nsid.map(Nsid::as_str).unwrap_or("<unresolved>"), error = %detail, "internal server error");
        #[cfg(not(feature = "tracing"))]
        let _ = (detail, nsid);
    }
    let status = kind.status();
    let body = kind.wire_body();
    (status, Json(body)).into_response()
}

/// Attach the rate-limit response-header quartet to an existing response
/// (§6 "Response headers set by the engine").
pub fn apply_rate_limit_headers(
    response: &mut Response,
    status: &xrpc_ratelimit::RateLimiterStatus,
) {
    for (name, value) in xrpc_ratelimit::status_headers(status) {
        response.headers_mut().insert(name, value);
    }
}

/// Merge handler-supplied headers onto a response on success (§6
/// "handler-supplied headers merged on success").
pub fn apply_handler_headers(response: &mut Response, headers: &xrpc_types::output::HeaderMap) {
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
}
