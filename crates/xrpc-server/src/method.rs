//! Per-route registration config (§4.8 "Registration").

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use xrpc_ratelimit::RouteLimiter;
use xrpc_types::{HandlerOutput, MethodDef, RequestContext};

/// Whether a route's auth verifier must run and succeed (§4.8 step 2
/// "if configured").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    Open,
    Required,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerOutput> + Send>>;

/// A query/procedure handler (§4.8 step 4 "invoke the handler").
pub type Handler<A> = Arc<dyn Fn(RequestContext<A>) -> HandlerFuture + Send + Sync>;

/// One registered query or procedure route.
pub struct MethodConfig<A> {
    pub def: MethodDef,
    pub auth: AuthRequirement,
    pub rate_limiters: Vec<RouteLimiter>,
    pub handler: Handler<A>,
}

impl<A> MethodConfig<A> {
    pub fn new(def: MethodDef, handler: Handler<A>) -> Self {
        Self {
            def,
            auth: AuthRequirement::Open,
            rate_limiters: Vec::new(),
            handler,
        }
    }

    pub fn require_auth(mut self) -> Self {
        self.auth = AuthRequirement::Required;
        self
    }

    pub fn rate_limit(mut self, limiter: RouteLimiter) -> Self {
        self.rate_limiters.push(limiter);
        self
    }
}

/// One item a subscription producer yields: either a fully-formed frame,
/// or a plain value subject to `$type` rewriting (§4.6).
pub enum StreamItem {
    Frame(xrpc_frame::Frame),
    Value(serde_json::Value),
}

pub type StreamBody =
    Pin<Box<dyn futures_core::Stream<Item = Result<StreamItem, xrpc_types::XrpcErrorKind>> + Send>>;

/// A subscription producer: given the verified context and a cancellation
/// signal tied to the socket's lifetime, returns the async sequence of
/// frames to send (§4.6, §9 "async generator to channel + token").
pub type StreamHandler<A> =
    Arc<dyn Fn(RequestContext<A>, CancellationToken) -> StreamBody + Send + Sync>;

/// One registered subscription route.
pub struct StreamConfig<A> {
    pub def: MethodDef,
    pub auth: AuthRequirement,
    pub handler: StreamHandler<A>,
}

impl<A> StreamConfig<A> {
    pub fn new(def: MethodDef, handler: StreamHandler<A>) -> Self {
        Self {
            def,
            auth: AuthRequirement::Open,
            handler,
        }
    }

    pub fn require_auth(mut self) -> Self {
        self.auth = AuthRequirement::Required;
        self
    }
}
