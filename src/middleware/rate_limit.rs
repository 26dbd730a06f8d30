//! Fixed-window rate limiter for the submission endpoint.
//!
//! Counts requests per client ref (source address) in a fixed window.
//! The counter resets on rollover rather than sliding; the contract is a
//! bounded ceiling per window, not exact pacing.

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Window {
    started: Instant,
    count: u64,
}

pub struct RateLimiter {
    max_requests: u64,
    window: Duration,
    counters: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            counters: DashMap::new(),
        }
    }

    /// Returns true if the client may submit. The count-and-compare runs
    /// under the entry's write guard, so concurrent callers from the same
    /// client cannot both sneak under the ceiling.
    pub fn allow(&self, client_ref: &str) -> bool {
        if self.max_requests == 0 {
            return true; // disabled
        }
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(client_ref.to_string())
            .or_insert_with(|| Window { started: now, count: 0 });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drop counters whose window has fully elapsed. A stale window would
    /// reset on the client's next call anyway; this reclaims the entries
    /// of clients that never come back. Returns the number removed.
    pub fn purge_stale(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters
            .retain(|_, window| now.duration_since(window.started) < self.window);
        before - self.counters.len()
    }
}
