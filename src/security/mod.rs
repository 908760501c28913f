//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! POST /client-logs:
//!     → rate_limit.rs (fixed window per client IP)
//!     → accepted, or 429 problem details
//! ```
//!
//! # Design Decisions
//! - Limits are read from live settings on every check, so a config reload
//!   applies to the next request
//! - No trust in client input: browser log events are redacted like any
//!   other payload

pub mod rate_limit;

pub use rate_limit::{ClientLogLimiter, RateDecision};
