// [libs/core/metering/src/rate_limiter.rs]
/*!
 * Sliding-window rate limiter (spec §4.3). One `RateLimiter` instance is
 * shared across keys; each `(scope, limit)` pair owns its own deque of
 * monotonic timestamps. `limit == 0` means unlimited — always allow,
 * never record (so a never-limited key costs no memory).
 */

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimitOutcome {
    pub allowed: bool,
    /// Milliseconds until the oldest tracked hit falls out of the window.
    pub reset_in_ms: u64,
}

pub struct RateLimiter {
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self { window, windows: Mutex::new(HashMap::new()) }
    }

    pub fn with_default_window() -> Self {
        Self::new(Duration::from_secs(60))
    }

    /// Checks and records a hit for `scope` against `limit` (calls per window).
    pub fn admit(&self, scope: &str, limit: u32) -> RateLimitOutcome {
        if limit == 0 {
            return RateLimitOutcome { allowed: true, reset_in_ms: 0 };
        }

        let now = Instant::now();
        let mut guard = self.windows.lock().expect("rate limiter lock poisoned");
        let deque = guard.entry(scope.to_string()).or_insert_with(VecDeque::new);

        while let Some(&front) = deque.front() {
            if now.duration_since(front) >= self.window {
                deque.pop_front();
            } else {
                break;
            }
        }

        if deque.len() as u32 >= limit {
            let reset_in_ms = deque
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)).as_millis() as u64)
                .unwrap_or(0);
            return RateLimitOutcome { allowed: false, reset_in_ms };
        }

        deque.push_back(now);
        RateLimitOutcome { allowed: true, reset_in_ms: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_scope_always_allows() {
        let limiter = RateLimiter::with_default_window();
        for _ in 0..1000 {
            assert!(limiter.admit("key", 0).allowed);
        }
    }

    #[test]
    fn exactly_limit_requests_allowed_then_denies() {
        let limiter = RateLimiter::with_default_window();
        for _ in 0..10 {
            assert!(limiter.admit("key", 10).allowed);
        }
        let outcome = limiter.admit("key", 10);
        assert!(!outcome.allowed);
        assert!(outcome.reset_in_ms <= 60_000);
    }

    #[test]
    fn separate_scopes_do_not_share_a_window() {
        let limiter = RateLimiter::with_default_window();
        for _ in 0..2 {
            assert!(limiter.admit("tool_a", 2).allowed);
        }
        assert!(!limiter.admit("tool_a", 2).allowed);
        assert!(limiter.admit("tool_b", 2).allowed);
    }
}
