//! Exponential backoff bounded by a total delay budget.

use std::time::Duration;

use crate::config::StartupConfig;

/// Retry policy: attempt count, base delay and total sleep budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_total_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_total_delay: Duration::from_secs(2),
        }
    }
}

impl From<&StartupConfig> for RetryPolicy {
    fn from(config: &StartupConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_total_delay: Duration::from_millis(config.max_total_delay_ms),
        }
    }
}

/// Next step after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Sleep for the given duration, then retry.
    Sleep(Duration),
    /// Retry immediately; the remaining budget rounded to nothing.
    Immediate,
    /// Stop and surface the last error.
    GiveUp,
}

impl RetryPolicy {
    /// Decide what follows failed attempt number `attempt` (1-based), given
    /// the time already spent sleeping.
    pub fn after_failure(&self, attempt: u32, slept: Duration) -> Backoff {
        if attempt >= self.max_attempts || slept >= self.max_total_delay {
            return Backoff::GiveUp;
        }
        let delay = calculate_backoff(attempt, self.base_delay)
            .min(self.max_total_delay.saturating_sub(slept));
        if delay.is_zero() {
            Backoff::Immediate
        } else {
            Backoff::Sleep(delay)
        }
    }

    /// Sleeps performed when every attempt fails.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut slept = Duration::ZERO;
        let mut delays = Vec::new();
        for attempt in 1..=self.max_attempts {
            match self.after_failure(attempt, slept) {
                Backoff::Sleep(delay) => {
                    slept += delay;
                    delays.push(delay);
                }
                Backoff::Immediate => {}
                Backoff::GiveUp => break,
            }
        }
        delays
    }
}

/// Uncapped exponential delay: `base * 2^(attempt - 1)`.
pub fn calculate_backoff(attempt: u32, base: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor)
}
