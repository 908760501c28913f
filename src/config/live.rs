//! Decision-time settings.
//!
//! Middleware reads these on every request. An environment-style key wins
//! over the file configuration; the file configuration itself can be swapped
//! at runtime by the config watcher. Invalid values never fail a request,
//! they fall back to the documented defaults.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::schema::{
    split_csv, ServiceConfig, DEFAULT_RESPONSE_BODY_MAX_BYTES, DEFAULT_SAMPLE_RATE,
};
use crate::config::source::{keys, ConfigSource};
use crate::observability::redact::Redactor;

/// Shared, hot-swappable view of the configuration.
#[derive(Clone)]
pub struct LiveSettings {
    file: Arc<ArcSwap<ServiceConfig>>,
    env: Arc<dyn ConfigSource>,
}

impl LiveSettings {
    pub fn new(config: ServiceConfig, env: Arc<dyn ConfigSource>) -> Self {
        Self {
            file: Arc::new(ArcSwap::from_pointee(config)),
            env,
        }
    }

    /// Replace the file configuration.
    pub fn apply(&self, config: ServiceConfig) {
        self.file.store(Arc::new(config));
    }

    /// Current file configuration.
    pub fn current(&self) -> Arc<ServiceConfig> {
        self.file.load_full()
    }

    /// Request-log sampling rate in [0, 1].
    pub fn sample_rate(&self) -> f64 {
        match self.env.get(keys::REQUEST_LOG_SAMPLE_RATE) {
            Some(raw) => parse_sample_rate(&raw),
            None => clamp_rate(self.file.load().observability.request_log_sample_rate),
        }
    }

    /// Response body capture limit in bytes (0 disables capture).
    pub fn response_body_max_bytes(&self) -> usize {
        match self.env.get(keys::RESPONSE_BODY_MAX_BYTES) {
            Some(raw) => parse_byte_limit(&raw),
            None => self.file.load().observability.response_body_max_bytes,
        }
    }

    /// Redaction policy for request/response payloads.
    pub fn redactor(&self) -> Redactor {
        match self.env.get(keys::SENSITIVE_FIELDS) {
            Some(raw) => Redactor::new(split_csv(&raw)),
            None => Redactor::new(&self.file.load().observability.sensitive_fields),
        }
    }

    /// Whether `path` is never audited.
    pub fn is_excluded(&self, path: &str) -> bool {
        let config = self.file.load();
        let obs = &config.observability;
        obs.excluded_paths.iter().any(|p| p == path)
            || obs.excluded_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Maximum request body size accepted by the listener.
    pub fn max_body_bytes(&self) -> usize {
        self.file.load().listener.max_body_bytes
    }

    /// Client log events allowed per window, and the window length.
    pub fn client_log_limit(&self) -> (u32, Duration) {
        let config = self.file.load();
        let limit = self
            .env
            .get(keys::CLIENT_LOG_RATE_LIMIT)
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(config.client_logs.rate_limit);
        let window = self
            .env
            .get(keys::CLIENT_LOG_WINDOW_SECONDS)
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(config.client_logs.window_secs);
        (limit, Duration::from_secs(window.max(1)))
    }
}

/// Parse a sampling rate; out-of-range values are clamped, garbage yields 1.0.
pub fn parse_sample_rate(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(rate) => clamp_rate(rate),
        Err(_) => DEFAULT_SAMPLE_RATE,
    }
}

/// Parse a byte limit; negative values become 0, garbage yields 2048.
pub fn parse_byte_limit(raw: &str) -> usize {
    match raw.trim().parse::<i64>() {
        Ok(limit) => usize::try_from(limit.max(0)).unwrap_or(DEFAULT_RESPONSE_BODY_MAX_BYTES),
        Err(_) => DEFAULT_RESPONSE_BODY_MAX_BYTES,
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        DEFAULT_SAMPLE_RATE
    } else {
        rate.clamp(0.0, 1.0)
    }
}
