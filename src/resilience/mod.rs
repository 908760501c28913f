//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Startup step (database check, migrations):
//!     → retries.rs (run, log each failure)
//!     → backoff.rs (sleep base * 2^(n-1), capped by remaining budget)
//!     → success, or the last error once attempts or budget run out
//! ```
//!
//! # Design Decisions
//! - Only transient startup work is retried; request handling never is
//! - The sleep budget is a hard ceiling across all attempts

pub mod backoff;
pub mod retries;

pub use backoff::{Backoff, RetryPolicy};
pub use retries::{run_with_retry, run_with_retry_until_shutdown};
