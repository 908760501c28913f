//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::config::source::{keys, ConfigSource};
use crate::health::normalize_database_url;
use crate::observability::redact::DEFAULT_SENSITIVE_FIELDS;

/// Default request-log sampling rate.
pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;

/// Default response body capture limit in bytes.
pub const DEFAULT_RESPONSE_BODY_MAX_BYTES: usize = 2048;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Logging, redaction, alerting and request audit settings.
    pub observability: ObservabilityConfig,

    /// Startup retry policy for the database step.
    pub startup: StartupConfig,

    /// Database connection settings.
    pub database: DatabaseConfig,

    /// Client log ingestion limits.
    pub client_logs: ClientLogConfig,
}

impl ServiceConfig {
    /// Apply startup-time environment overrides (`PORT`, `DATABASE_URL`,
    /// `LOG_LEVEL`, `LOG_SLACK_WEBHOOK_URL`, `SENSITIVE_FIELDS`).
    ///
    /// Decision-time keys (sampling, body limit, client log limits) are not
    /// copied here; they are read live through `LiveSettings`.
    pub fn apply_env(&mut self, source: &dyn ConfigSource) {
        if let Some(port) = source.get(keys::PORT).and_then(|p| p.parse::<u16>().ok()) {
            let host = self
                .listener
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.listener.bind_address = format!("{}:{}", host, port);
        }
        if let Some(url) = source.get(keys::DATABASE_URL) {
            self.database.url = Some(normalize_database_url(&url));
        }
        if let Some(level) = source.get(keys::LOG_LEVEL) {
            self.observability.log_level = level;
        }
        if let Some(url) = source.get(keys::ALERT_WEBHOOK_URL) {
            self.observability.alert_webhook_url = Some(url);
        }
        if let Some(fields) = source.get(keys::SENSITIVE_FIELDS) {
            self.observability.sensitive_fields = split_csv(&fields);
        }
    }
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_csv(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Case-insensitive field names redacted before logging.
    pub sensitive_fields: Vec<String>,

    /// Webhook receiving ERROR summaries. Alerts are off when unset.
    pub alert_webhook_url: Option<String>,

    /// Webhook request timeout in milliseconds.
    pub alert_timeout_ms: u64,

    /// Alerts buffered while the webhook is slow; extra alerts are dropped.
    pub alert_queue_capacity: usize,

    /// Fraction of requests whose audit events are emitted (0.0 - 1.0).
    pub request_log_sample_rate: f64,

    /// Response body bytes kept in `request_end` (0 disables capture).
    pub response_body_max_bytes: usize,

    /// Paths never audited.
    pub excluded_paths: Vec<String>,

    /// Path prefixes never audited.
    pub excluded_prefixes: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            alert_webhook_url: None,
            alert_timeout_ms: 2000,
            alert_queue_capacity: 64,
            request_log_sample_rate: DEFAULT_SAMPLE_RATE,
            response_body_max_bytes: DEFAULT_RESPONSE_BODY_MAX_BYTES,
            excluded_paths: vec!["/health".to_string(), "/ready".to_string()],
            excluded_prefixes: vec!["/static".to_string(), "/_static".to_string()],
        }
    }
}

/// Retry policy applied to the startup database step.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StartupConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Total time budget spent sleeping between attempts, in milliseconds.
    pub max_total_delay_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_total_delay_ms: 2000,
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL. Local file databases (or none) are always reachable.
    pub url: Option<String>,

    /// Reachability probe timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: 1000,
        }
    }
}

/// Client log ingestion limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientLogConfig {
    /// Accepted client log events per client IP and window.
    pub rate_limit: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for ClientLogConfig {
    fn default() -> Self {
        Self {
            rate_limit: 30,
            window_secs: 60,
        }
    }
}
