//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/correlation.rs (X-Request-ID, context scope)
//!     → body limit
//!     → middleware/audit.rs (sampling, request_start, request_end)
//!         → request.rs (client IP, query, redacted JSON body)
//!         → response.rs (redacted, truncated body, headers)
//!     → timeout, panic catcher
//!     → handlers.rs (health, ready, client logs, 404)
//!     → error.rs (problem details)
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use error::{ApiError, ProblemDetails};
pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
