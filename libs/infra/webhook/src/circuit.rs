// [libs/infra/webhook/src/circuit.rs]
/*!
 * Per-URL circuit breaker: after `trip_threshold` consecutive delivery
 * failures, further attempts to the same URL are short-circuited for
 * `cooldown` before the next attempt is allowed through.
 */

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CircuitState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    trip_threshold: u32,
    cooldown: Duration,
    states: Mutex<HashMap<String, CircuitState>>,
}

impl CircuitBreaker {
    pub fn new(trip_threshold: u32, cooldown: Duration) -> Self {
        Self {
            trip_threshold,
            cooldown,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// `true` if the circuit for `url` is currently open and deliveries
    /// should be short-circuited.
    pub fn is_open(&self, url: &str) -> bool {
        let guard = self.states.lock().expect("circuit lock poisoned");
        match guard.get(url) {
            Some(state) => match state.opened_at {
                Some(opened_at) => opened_at.elapsed() < self.cooldown,
                None => false,
            },
            None => false,
        }
    }

    pub fn record_success(&self, url: &str) {
        let mut guard = self.states.lock().expect("circuit lock poisoned");
        guard.remove(url);
    }

    pub fn record_failure(&self, url: &str) {
        let mut guard = self.states.lock().expect("circuit lock poisoned");
        let state = guard.entry(url.to_string()).or_insert(CircuitState {
            consecutive_failures: 0,
            opened_at: None,
        });
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.trip_threshold {
            state.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_below_threshold() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        cb.record_failure("https://a");
        cb.record_failure("https://a");
        assert!(!cb.is_open("https://a"));
    }

    #[test]
    fn opens_at_threshold() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            cb.record_failure("https://a");
        }
        assert!(cb.is_open("https://a"));
    }

    #[test]
    fn success_resets_the_count() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        cb.record_failure("https://a");
        cb.record_success("https://a");
        cb.record_failure("https://a");
        assert!(!cb.is_open("https://a"));
    }

    #[test]
    fn independent_per_url() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60));
        cb.record_failure("https://a");
        assert!(cb.is_open("https://a"));
        assert!(!cb.is_open("https://b"));
    }
}
