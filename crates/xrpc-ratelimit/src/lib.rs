//! Layered token-bucket rate limiting for the XRPC dispatch engine (§4.5).
//!
//! A [`Limiter`] is a single named bucket. A [`RateLimiterRegistry`] holds
//! the dispatcher-wide set of global and named-shared limiters and
//! evaluates a route's limiters concurrently, picking the tightest
//! resulting status.

pub mod error;
pub mod limiter;
pub mod set;
pub mod status;
pub mod store;

pub use error::RateLimiterError;
pub use limiter::{default_calc_key, Limiter};
pub use set::{status_headers, RateLimiterRegistry, RouteLimiter};
pub use status::{ConsumeResult, RateLimiterStatus};
pub use store::{InMemoryRateLimiterStore, RateLimiterStore};
