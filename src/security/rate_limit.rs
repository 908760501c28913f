//! Fixed-window rate limiting for client log ingestion.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Entries kept before expired windows are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Per-key fixed window counter.
#[derive(Debug, Default)]
pub struct ClientLogLimiter {
    windows: DashMap<String, Window>,
}

impl ClientLogLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event for `key` against `limit` events per `window`.
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        self.check_at(key, limit, window, Instant::now())
    }

    fn check_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> RateDecision {
        if self.windows.len() > SWEEP_THRESHOLD {
            self.sweep(window, now);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= limit {
            let retry_after = window.saturating_sub(now.saturating_duration_since(entry.started));
            tracing::warn!(client = %key, limit, "Client log rate limit exceeded");
            return RateDecision::Limited { retry_after };
        }
        entry.count += 1;
        RateDecision::Allowed
    }

    fn sweep(&self, window: Duration, now: Instant) {
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
    }

    /// Number of tracked clients.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}
