//! The wire-visible result of a single limiter evaluation (§3 "RateLimiterStatus").

/// Invariant: `0 <= remaining_points <= limit` and
/// `consumed_points + remaining_points == limit` at the instant of
/// observation. `consumed_points` is clamped to `limit`, so whether this
/// particular call went over is carried separately in `exceeded` rather
/// than re-derived from the clamped fields (a bucket that lands exactly on
/// `limit` is not exceeded; one the store had to clamp down to `limit` is).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterStatus {
    pub limit: u64,
    pub duration_ms: u64,
    pub remaining_points: u64,
    pub ms_before_next: u64,
    pub consumed_points: u64,
    pub is_first_in_duration: bool,
    exceeded: bool,
}

impl RateLimiterStatus {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        limit: u64,
        duration_ms: u64,
        remaining_points: u64,
        ms_before_next: u64,
        consumed_points: u64,
        is_first_in_duration: bool,
        exceeded: bool,
    ) -> Self {
        Self {
            limit,
            duration_ms,
            remaining_points,
            ms_before_next,
            consumed_points,
            is_first_in_duration,
            exceeded,
        }
    }

    pub fn exceeded(&self) -> bool {
        self.exceeded
    }

    /// Pick the tighter of two statuses: an exceeded status always wins;
    /// otherwise the one with fewer remaining points wins (§4.5
    /// "Composition").
    pub fn tightest(self, other: Self) -> Self {
        match (self.exceeded(), other.exceeded()) {
            (true, false) => self,
            (false, true) => other,
            _ => {
                if self.remaining_points <= other.remaining_points {
                    self
                } else {
                    other
                }
            }
        }
    }
}

/// The outcome of evaluating a single [`crate::Limiter`] (§4.5 "consume").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeResult {
    Allowed(RateLimiterStatus),
    Exceeded(RateLimiterStatus),
    /// `calcKey` returned nothing, or `calcPoints` was non-positive, or the
    /// store failed and the limiter is fail-open.
    Skipped,
}

impl ConsumeResult {
    pub fn status(&self) -> Option<RateLimiterStatus> {
        match self {
            ConsumeResult::Allowed(s) | ConsumeResult::Exceeded(s) => Some(*s),
            ConsumeResult::Skipped => None,
        }
    }
}
