//! Named token-bucket limiters and their `calcKey`/`calcPoints` hooks
//! (§4.5).

use std::sync::Arc;

use governor::Quota;
use http::HeaderMap;
use smol_str::SmolStr;

use crate::error::RateLimiterError;
use crate::status::ConsumeResult;
use crate::store::RateLimiterStore;

type CalcKeyFn = Arc<dyn Fn(&HeaderMap) -> Option<String> + Send + Sync>;
type CalcPointsFn = Arc<dyn Fn(&HeaderMap) -> i64 + Send + Sync>;

/// Default `calcKey`: first `x-forwarded-for` element, else `x-real-ip`,
/// else `"unknown"` (§4.5).
pub fn default_calc_key(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let trimmed = real_ip.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    Some("unknown".to_string())
}

/// A single named token bucket: `(keyPrefix, durationMs, points)` (§4.5).
pub struct Limiter {
    pub name: Option<SmolStr>,
    key_prefix: SmolStr,
    duration_ms: u64,
    points: u64,
    fail_closed: bool,
    calc_key: Option<CalcKeyFn>,
    calc_points: Option<CalcPointsFn>,
}

impl Limiter {
    /// `quota` is validated against `governor`'s `Quota` type to reject
    /// zero-duration or zero-point limiters the same way the embedding
    /// application would reject a malformed rate-limit config at startup.
    pub fn new(key_prefix: impl Into<SmolStr>, duration_ms: u64, points: u64) -> Self {
        let limit = std::num::NonZeroU32::new(points.clamp(1, u32::MAX as u64) as u32)
            .unwrap_or(nonzero_ext::nonzero!(1u32));
        if let Some(quota) = Quota::with_period(std::time::Duration::from_millis(duration_ms.max(1))) {
            let _ = quota.allow_burst(limit);
        }
        Self {
            name: None,
            key_prefix: key_prefix.into(),
            duration_ms,
            points,
            fail_closed: false,
            calc_key: None,
            calc_points: None,
        }
    }

    pub fn named(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn calc_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&HeaderMap) -> Option<String> + Send + Sync + 'static,
    {
        self.calc_key = Some(Arc::new(f));
        self
    }

    pub fn calc_points<F>(mut self, f: F) -> Self
    where
        F: Fn(&HeaderMap) -> i64 + Send + Sync + 'static,
    {
        self.calc_points = Some(Arc::new(f));
        self
    }

    pub fn fail_closed(mut self) -> Self {
        self.fail_closed = true;
        self
    }

    /// Evaluate this limiter for one request (§4.5 "consume"). A store
    /// failure is fail-open unless [`Limiter::fail_closed`] was set, in
    /// which case it propagates.
    pub async fn consume<S: RateLimiterStore>(
        &self,
        store: &S,
        headers: &HeaderMap,
    ) -> Result<ConsumeResult, RateLimiterError> {
        let key = match &self.calc_key {
            Some(f) => match f(headers) {
                Some(k) => k,
                None => return Ok(ConsumeResult::Skipped),
            },
            None => match default_calc_key(headers) {
                Some(k) => k,
                None => return Ok(ConsumeResult::Skipped),
            },
        };

        let points = match &self.calc_points {
            Some(f) => f(headers),
            None => 1,
        };
        if points <= 0 {
            return Ok(ConsumeResult::Skipped);
        }

        let full_key = format!("{}:{}", self.key_prefix, key);
        match store
            .consume(&full_key, self.duration_ms, self.points, points as u64)
            .await
        {
            Ok(status) if status.exceeded() => Ok(ConsumeResult::Exceeded(status)),
            Ok(status) => Ok(ConsumeResult::Allowed(status)),
            Err(err) => {
                if self.fail_closed {
                    Err(err)
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(limiter = %self.key_prefix, error = %err, "rate limiter store failed, failing open");
                    Ok(ConsumeResult::Skipped)
                }
            }
        }
    }

    /// Clear this limiter's counter for the caller-supplied key (§4.5
    /// "resetRouteRateLimits").
    pub async fn reset<S: RateLimiterStore>(
        &self,
        store: &S,
        headers: &HeaderMap,
    ) -> Result<(), RateLimiterError> {
        let key = match &self.calc_key {
            Some(f) => f(headers),
            None => default_calc_key(headers),
        };
        if let Some(key) = key {
            store.reset(&format!("{}:{}", self.key_prefix, key)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRateLimiterStore;

    fn headers_with_xff(ip: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", ip.parse().unwrap());
        h
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_buckets() {
        let store = InMemoryRateLimiterStore::new();
        let limiter = Limiter::new("test", 60_000, 1);

        let a = limiter.consume(&store, &headers_with_xff("1.1.1.1")).await.unwrap();
        assert!(matches!(a, ConsumeResult::Allowed(_)));
        let b = limiter.consume(&store, &headers_with_xff("2.2.2.2")).await.unwrap();
        assert!(matches!(b, ConsumeResult::Allowed(_)));
        let a_again = limiter.consume(&store, &headers_with_xff("1.1.1.1")).await.unwrap();
        assert!(matches!(a_again, ConsumeResult::Exceeded(_)));
    }

    #[tokio::test]
    async fn calc_points_skips_on_non_positive() {
        let store = InMemoryRateLimiterStore::new();
        let limiter = Limiter::new("test", 60_000, 1).calc_points(|_| 0);
        let result = limiter.consume(&store, &HeaderMap::new()).await.unwrap();
        assert!(matches!(result, ConsumeResult::Skipped));
    }

    #[tokio::test]
    async fn calc_key_none_skips() {
        let store = InMemoryRateLimiterStore::new();
        let limiter = Limiter::new("test", 60_000, 1).calc_key(|_| None);
        let result = limiter.consume(&store, &HeaderMap::new()).await.unwrap();
        assert!(matches!(result, ConsumeResult::Skipped));
    }
}
