//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request middleware and handlers produce:
//!     → context.rs (correlation ID + accumulated request context)
//!     → timing.rs (database time into the context)
//!
//! Every tracing event:
//!     → logging.rs (JSON line: fixed schema + context + redacted extras)
//!     → alert.rs (ERROR events only, queued for the webhook worker)
//!
//! redact.rs is applied to extras, request payloads and response bodies.
//! ```
//!
//! # Design Decisions
//! - One JSON object per line on stdout; the key set never varies
//! - Correlation ID flows through a task-local, not through function arguments
//! - Nothing in this module may fail a request or block on the network

pub mod alert;
pub mod context;
pub mod logging;
pub mod redact;
pub mod timing;

pub use alert::{AlertLayer, AlertSink};
pub use context::RequestContext;
pub use logging::{init_logging, JsonLogLayer, Structured, LOG_FIELDS};
pub use redact::{Redactor, REDACTED};
pub use timing::DbTimer;
