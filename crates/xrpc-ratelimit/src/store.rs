//! The rate-limit storage backend (§1 external collaborator: "the
//! underlying rate-limit storage backend (in-memory or Redis-like)").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::RateLimiterError;
use crate::status::RateLimiterStatus;

/// A pluggable rate-limit counter store. The default implementation is
/// in-memory; a Redis-like remote store is a drop-in replacement behind the
/// same trait.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait RateLimiterStore {
    /// Consume `cost` points against the bucket named `key`, which refills
    /// to `limit` points every `duration_ms` milliseconds. Returns the
    /// resulting status regardless of whether the bucket was exceeded; the
    /// caller (a [`crate::Limiter`]) decides what exceeding means.
    async fn consume(
        &self,
        key: &str,
        duration_ms: u64,
        limit: u64,
        cost: u64,
    ) -> Result<RateLimiterStatus, RateLimiterError>;

    /// Clear the counter for `key`, if any (§4.5 "resetRouteRateLimits").
    async fn reset(&self, key: &str) -> Result<(), RateLimiterError>;
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    consumed: u64,
}

/// The in-memory default store: one fixed window per key, resetting once
/// `duration_ms` has elapsed since the window started.
#[derive(Default)]
pub struct InMemoryRateLimiterStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl InMemoryRateLimiterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiterStore for InMemoryRateLimiterStore {
    async fn consume(
        &self,
        key: &str,
        duration_ms: u64,
        limit: u64,
        cost: u64,
    ) -> Result<RateLimiterStatus, RateLimiterError> {
        let now = Instant::now();
        let duration = Duration::from_millis(duration_ms);

        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| RateLimiterError::StoreFailed("poisoned lock".into()))?;

        let mut is_first_in_duration = false;
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| {
            is_first_in_duration = true;
            Bucket {
                window_start: now,
                consumed: 0,
            }
        });

        if now.duration_since(bucket.window_start) >= duration {
            bucket.window_start = now;
            bucket.consumed = 0;
            is_first_in_duration = true;
        }

        bucket.consumed = bucket.consumed.saturating_add(cost);
        let exceeded = bucket.consumed > limit;
        let elapsed = now.duration_since(bucket.window_start);
        let ms_before_next = duration_ms.saturating_sub(elapsed.as_millis() as u64);
        let consumed_reported = bucket.consumed.min(limit);
        let remaining_points = limit.saturating_sub(consumed_reported);

        Ok(RateLimiterStatus::new(
            limit,
            duration_ms,
            remaining_points,
            if remaining_points == 0 { ms_before_next } else { 0 },
            consumed_reported,
            is_first_in_duration,
            exceeded,
        ))
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimiterError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| RateLimiterError::StoreFailed("poisoned lock".into()))?;
        buckets.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_exceeds() {
        let store = InMemoryRateLimiterStore::new();
        for i in 0..5 {
            let status = store.consume("k", 300_000, 5, 1).await.unwrap();
            assert_eq!(status.consumed_points, i + 1);
            assert!(!status.exceeded());
        }
        let status = store.consume("k", 300_000, 5, 1).await.unwrap();
        assert!(status.exceeded());
        assert_eq!(status.remaining_points, 0);
    }

    #[tokio::test]
    async fn first_consume_is_first_in_duration() {
        let store = InMemoryRateLimiterStore::new();
        let first = store.consume("k", 60_000, 10, 1).await.unwrap();
        assert!(first.is_first_in_duration);
        let second = store.consume("k", 60_000, 10, 1).await.unwrap();
        assert!(!second.is_first_in_duration);
    }

    #[tokio::test]
    async fn reset_clears_the_bucket() {
        let store = InMemoryRateLimiterStore::new();
        store.consume("k", 60_000, 1, 1).await.unwrap();
        let exceeded = store.consume("k", 60_000, 1, 1).await.unwrap();
        assert!(exceeded.exceeded());
        store.reset("k").await.unwrap();
        let status = store.consume("k", 60_000, 1, 1).await.unwrap();
        assert!(!status.exceeded());
        assert!(status.is_first_in_duration);
    }
}
