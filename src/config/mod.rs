//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig::apply_env (startup-time environment overrides)
//!     → live.rs (Arc-swapped, read by middleware on every request)
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → LiveSettings::apply swaps it in
//!
//! Decision-time keys (sampling rate, body limit, client log limits) are
//! looked up in source.rs on every request and win over the file.
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Invalid files are rejected as a whole; invalid environment values fall
//!   back to defaults instead of failing requests

pub mod live;
pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;
pub mod watcher;

pub use live::LiveSettings;
pub use schema::{
    ClientLogConfig, DatabaseConfig, ListenerConfig, ObservabilityConfig, ServiceConfig,
    StartupConfig, TimeoutConfig,
};
pub use source::{ConfigSource, EnvSource, MapSource};
