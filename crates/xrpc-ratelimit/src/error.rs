//! Rate limiter error taxonomy (§4.5).

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RateLimiterError {
    #[error("rate limiter store failed: {0}")]
    StoreFailed(String),

    #[error("route references unknown shared rate limiter {0:?}")]
    UnknownSharedLimiter(String),
}
