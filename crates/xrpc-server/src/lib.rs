//! The axum-based request dispatcher: route registration, the per-request
//! middleware chain (auth, body parse, rate limiting), and the WebSocket
//! subscription producer (§4.8, §4.6).

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod method;
pub mod ws;

pub use auth::{decode_basic_auth, verifier, AuthFuture, AuthRequest, AuthVerifier};
pub use config::{DispatcherConfig, ErrorParser, RateLimitBypass};
pub use dispatcher::Dispatcher;
pub use error::error_response;
pub use method::{
    AuthRequirement, Handler, HandlerFuture, MethodConfig, StreamBody, StreamConfig,
    StreamHandler, StreamItem,
};
