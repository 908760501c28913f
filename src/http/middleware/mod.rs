//! Request pipeline middleware.
//!
//! Outermost first: correlation → body limit → audit → timeout → panic
//! catcher → handler.

pub mod audit;
pub mod correlation;

pub use audit::{request_audit_middleware, should_log_request};
pub use correlation::correlation_middleware;
