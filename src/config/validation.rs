//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and URLs. All
//! problems are reported at once rather than stopping at the first.

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("observability.request_log_sample_rate {0} is outside 0.0..=1.0")]
    SampleRate(f64),
    #[error("{field} '{value}' is not a valid URL")]
    Url { field: &'static str, value: String },
    #[error("observability.alert_webhook_url must use http or https")]
    WebhookScheme,
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let positive: [(&'static str, u64); 6] = [
        ("listener.max_body_bytes", config.listener.max_body_bytes as u64),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("observability.alert_timeout_ms", config.observability.alert_timeout_ms),
        (
            "observability.alert_queue_capacity",
            config.observability.alert_queue_capacity as u64,
        ),
        ("startup.max_attempts", u64::from(config.startup.max_attempts)),
        ("client_logs.window_secs", config.client_logs.window_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    let rate = config.observability.request_log_sample_rate;
    if !(0.0..=1.0).contains(&rate) {
        errors.push(ValidationError::SampleRate(rate));
    }

    if let Some(raw) = &config.observability.alert_webhook_url {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(_) => errors.push(ValidationError::WebhookScheme),
            Err(_) => errors.push(ValidationError::Url {
                field: "observability.alert_webhook_url",
                value: raw.clone(),
            }),
        }
    }

    if let Some(raw) = &config.database.url {
        if Url::parse(raw).is_err() {
            errors.push(ValidationError::Url {
                field: "database.url",
                value: raw.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
