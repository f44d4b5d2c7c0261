//! Reconnect backoff schedule (§4.7 step 1).
//!
//! `attempt` counts reconnect attempts since the last successful open
//! (`0` = the very first connection of the process, never delayed).
//! Attempt `1` (the first reconnect after a drop) waits a flat
//! `min(1s, maxReconnectMs)`; every attempt after that backs off
//! exponentially with jitter.

use std::time::Duration;

/// `backoff(n) = min(maxReconnectMs, 1000 * (2^n + jitter))`,
/// `jitter ∈ [-0.5, 0.5)`.
pub fn exponential(attempt: u32, max_reconnect_ms: u64) -> Duration {
    let jitter = rand::random::<f64>() - 0.5;
    let growth = 2f64.powi(attempt as i32) + jitter;
    let ms = (1000.0 * growth).max(0.0) as u64;
    Duration::from_millis(ms.min(max_reconnect_ms))
}

/// The wait before opening attempt `attempt` (`0`-indexed reconnect
/// counter; `0` means "this is the first connection ever", no wait).
pub fn reconnect_wait(attempt: u32, max_reconnect_ms: u64) -> Duration {
    match attempt {
        0 => Duration::ZERO,
        1 => Duration::from_millis(max_reconnect_ms.min(1000)),
        n => exponential(n, max_reconnect_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_connection_never_waits() {
        assert_eq!(reconnect_wait(0, 60_000), Duration::ZERO);
    }

    #[test]
    fn first_reconnect_is_capped_at_one_second() {
        assert_eq!(reconnect_wait(1, 500), Duration::from_millis(500));
        assert_eq!(reconnect_wait(1, 60_000), Duration::from_millis(1000));
    }

    #[test]
    fn later_attempts_grow_but_respect_the_ceiling() {
        for attempt in 2..10 {
            let d = reconnect_wait(attempt, 5_000);
            assert!(d <= Duration::from_millis(5_000));
        }
    }

    #[test]
    fn exponential_growth_is_monotone_in_expectation() {
        // jitter can make any single sample noisy, so compare the
        // jitter-free floor of each attempt instead of raw samples.
        let floor = |n: u32| (1000.0 * (2f64.powi(n as i32) - 0.5)).max(0.0) as u64;
        assert!(floor(4) > floor(2));
        assert!(floor(6) > floor(4));
    }
}
