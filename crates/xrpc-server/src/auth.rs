//! The auth verifier seam (§4.8 step 2, §3 "Auth").
//!
//! The dispatcher is deliberately agnostic about how auth is performed.
//! A dispatcher-wide [`AuthVerifier`] closure is handed the resolved NSID
//! and the request's headers — params and input are not yet decoded at
//! this point, since auth runs before body parse (§5 ordering guarantees)
//! — and returns either an opaque payload of type `A` or an
//! [`XrpcErrorKind`]. `xrpc-auth`'s service-JWT `verify` is one concrete
//! thing a verifier closure can wrap; Basic auth or any other scheme is
//! just as valid a closure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::HeaderMap;
use xrpc_types::{Nsid, XrpcErrorKind};

/// What a verifier sees (§4.8 step 2's `{req, params?, input?}`, minus the
/// not-yet-decoded params/input).
pub struct AuthRequest<'a> {
    pub nsid: &'a Nsid,
    pub headers: &'a HeaderMap,
}

pub type AuthFuture<A> = Pin<Box<dyn Future<Output = Result<A, XrpcErrorKind>> + Send>>;

/// A dispatcher-wide auth verifier. `A` is the opaque payload attached to
/// the request context on success (§3 "Auth").
pub type AuthVerifier<A> = Arc<dyn Fn(AuthRequest<'_>) -> AuthFuture<A> + Send + Sync>;

/// Build a verifier out of an async closure, boxing its future so it fits
/// the dyn-compatible [`AuthVerifier`] alias.
pub fn verifier<A, F, Fut>(f: F) -> AuthVerifier<A>
where
    F: Fn(AuthRequest<'_>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<A, XrpcErrorKind>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Extract `Basic` credentials from an `Authorization` header, for use in
/// a verifier closure (§8 scenario 7 "Basic-auth protected procedure").
pub fn decode_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
