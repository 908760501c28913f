//! Health and readiness subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (lifecycle/startup.rs):
//!     database.rs probe under the retry policy
//!     → mark ready / degraded
//!
//! GET /ready:
//!     ready flag set → 200
//!     otherwise one re-probe → update flag → 200 or 503
//! ```
//!
//! # Design Decisions
//! - Liveness (`/health`) never touches the database
//! - A failed probe degrades readiness; it never stops the process

pub mod database;

pub use database::{normalize_database_url, Database, DatabaseError};
