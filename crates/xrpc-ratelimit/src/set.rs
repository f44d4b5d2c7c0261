//! Global + named-shared + route limiter composition and
//! "tightest status wins" aggregation (§4.5 "Composition").

use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderMap;
use smol_str::SmolStr;

use crate::error::RateLimiterError;
use crate::limiter::Limiter;
use crate::status::{ConsumeResult, RateLimiterStatus};
use crate::store::RateLimiterStore;

/// A route's reference to a limiter: either a shared limiter looked up by
/// name, or one declared inline for that route alone.
pub enum RouteLimiter {
    Shared(SmolStr),
    Inline(Arc<Limiter>),
}

/// The dispatcher-wide limiter registry: a list of global limiters
/// evaluated on every request, plus a map of named limiters routes can
/// reference by name (§4.5 "Composition").
#[derive(Default)]
pub struct RateLimiterRegistry {
    global: Vec<Arc<Limiter>>,
    named: HashMap<SmolStr, Arc<Limiter>>,
    /// When true for a given request, all limiters are skipped (§4.5
    /// "Bypass").
    bypass: Option<Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, limiter: Limiter) -> &mut Self {
        self.global.push(Arc::new(limiter));
        self
    }

    pub fn add_named(&mut self, limiter: Limiter) -> &mut Self {
        let name = limiter
            .name
            .clone()
            .expect("shared limiters registered by name must be named");
        self.named.insert(name, Arc::new(limiter));
        self
    }

    pub fn shared(&self, name: &str) -> Option<Arc<Limiter>> {
        self.named.get(name).cloned()
    }

    pub fn set_bypass<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&HeaderMap) -> bool + Send + Sync + 'static,
    {
        self.bypass = Some(Arc::new(f));
        self
    }

    fn bypassed(&self, headers: &HeaderMap) -> bool {
        self.bypass.as_ref().is_some_and(|f| f(headers))
    }

    /// Evaluate the global limiters alone (catch-all, before method
    /// resolution, §4.5 "Ordering vs. auth").
    pub async fn evaluate_global<S: RateLimiterStore>(
        &self,
        store: &S,
        headers: &HeaderMap,
    ) -> Result<ConsumeResult, RateLimiterError> {
        if self.bypassed(headers) {
            return Ok(ConsumeResult::Skipped);
        }
        evaluate_all(self.global.iter().map(Arc::as_ref), store, headers).await
    }

    /// Evaluate a route's own limiters, resolving `Shared` references
    /// against the named map, and combine the result with `global` — the
    /// status from a prior [`Self::evaluate_global`] call — so the global
    /// buckets are consumed exactly once per request (§4.5 "Composition").
    pub async fn evaluate_route<S: RateLimiterStore>(
        &self,
        global: ConsumeResult,
        route: &[RouteLimiter],
        store: &S,
        headers: &HeaderMap,
    ) -> Result<ConsumeResult, RateLimiterError> {
        if self.bypassed(headers) {
            return Ok(ConsumeResult::Skipped);
        }
        let owned = self.resolve(route)?;
        let route_result = evaluate_all(owned.iter().map(Arc::as_ref), store, headers).await?;
        Ok(combine([global, route_result]))
    }

    /// Clear a route's own limiter counters for this request's key (§4.5
    /// "resetRouteRateLimits"); the global buckets are untouched.
    pub async fn reset_route<S: RateLimiterStore>(
        &self,
        route: &[RouteLimiter],
        store: &S,
        headers: &HeaderMap,
    ) -> Result<(), RateLimiterError> {
        let owned = self.resolve(route)?;
        for limiter in &owned {
            limiter.reset(store, headers).await?;
        }
        Ok(())
    }

    fn resolve(&self, route: &[RouteLimiter]) -> Result<Vec<Arc<Limiter>>, RateLimiterError> {
        let mut owned = Vec::with_capacity(route.len());
        for r in route {
            let limiter = match r {
                RouteLimiter::Shared(name) => self
                    .named
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RateLimiterError::UnknownSharedLimiter(name.to_string()))?,
                RouteLimiter::Inline(limiter) => limiter.clone(),
            };
            owned.push(limiter);
        }
        Ok(owned)
    }
}

async fn evaluate_all<'a, S: RateLimiterStore>(
    limiters: impl Iterator<Item = &'a Limiter>,
    store: &S,
    headers: &HeaderMap,
) -> Result<ConsumeResult, RateLimiterError> {
    let mut futures = Vec::new();
    for limiter in limiters {
        futures.push(limiter.consume(store, headers));
    }
    let results = futures_util::future::try_join_all(futures).await?;
    Ok(combine(results))
}

/// Pick the tightest status across a set of per-limiter results (§4.5
/// "Composition": any `Exceeded` wins, otherwise the least `remainingPoints`).
fn combine(results: impl IntoIterator<Item = ConsumeResult>) -> ConsumeResult {
    let mut tightest: Option<RateLimiterStatus> = None;
    let mut any_exceeded = false;
    for result in results {
        if let Some(status) = result.status() {
            any_exceeded |= matches!(result, ConsumeResult::Exceeded(_));
            tightest = Some(match tightest {
                Some(current) => current.tightest(status),
                None => status,
            });
        }
    }

    match tightest {
        Some(status) if any_exceeded => ConsumeResult::Exceeded(status),
        Some(status) => ConsumeResult::Allowed(status),
        None => ConsumeResult::Skipped,
    }
}

/// The standard rate-limit response header quartet (§4.5 "Composition").
pub fn status_headers(status: &RateLimiterStatus) -> [(http::HeaderName, http::HeaderValue); 4] {
    use http::{HeaderName, HeaderValue};
    let reset_secs = status.ms_before_next.div_ceil(1000);
    [
        (
            HeaderName::from_static("ratelimit-limit"),
            HeaderValue::from_str(&status.limit.to_string()).unwrap(),
        ),
        (
            HeaderName::from_static("ratelimit-remaining"),
            HeaderValue::from_str(&status.remaining_points.to_string()).unwrap(),
        ),
        (
            HeaderName::from_static("ratelimit-reset"),
            HeaderValue::from_str(&reset_secs.to_string()).unwrap(),
        ),
        (
            HeaderName::from_static("ratelimit-policy"),
            HeaderValue::from_str(&format!("{};w={}", status.limit, status.duration_ms / 1000))
                .unwrap(),
        ),
    ]
}
