//! Database timing.

use std::time::Instant;

use serde_json::Value;

use crate::observability::context;

/// Context key holding accumulated database time.
pub const DB_TIME_KEY: &str = "db_time_ms";

/// Round a millisecond figure to two decimals.
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Scoped timer adding its elapsed time to `db_time_ms` when dropped.
///
/// Several timers in one request accumulate into the same key.
#[must_use = "the timer records on drop"]
pub struct DbTimer {
    start: Instant,
}

impl DbTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for DbTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
        let previous = context::get_context()
            .get(DB_TIME_KEY)
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        context::merge_field(DB_TIME_KEY, round_ms(previous + elapsed));
    }
}
