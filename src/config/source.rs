//! Environment-style key/value configuration sources.
//!
//! Values are looked up on every call, so a source backed by the process
//! environment reflects changes without a restart. Blank values are treated
//! as absent.

use dashmap::DashMap;

/// Configuration keys understood by the service.
pub mod keys {
    pub const SENSITIVE_FIELDS: &str = "SENSITIVE_FIELDS";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ALERT_WEBHOOK_URL: &str = "LOG_SLACK_WEBHOOK_URL";
    pub const REQUEST_LOG_SAMPLE_RATE: &str = "REQUEST_LOG_SAMPLE_RATE";
    pub const RESPONSE_BODY_MAX_BYTES: &str = "RESPONSE_BODY_MAX_BYTES";
    pub const CLIENT_LOG_RATE_LIMIT: &str = "CLIENT_LOG_RATE_LIMIT";
    pub const CLIENT_LOG_WINDOW_SECONDS: &str = "CLIENT_LOG_WINDOW_SECONDS";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const PORT: &str = "PORT";
}

/// A source of string configuration values.
pub trait ConfigSource: Send + Sync {
    /// Raw value for `key`, or `None` if unset or blank.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// In-memory source whose values can be changed at runtime.
#[derive(Debug, Default)]
pub struct MapSource {
    values: DashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from key/value pairs.
    pub fn with<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source = Self::new();
        for (key, value) in pairs {
            source.set(key, value);
        }
        source
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.values.remove(key);
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_source_blank_is_absent() {
        let source = MapSource::with([("A", "1"), ("B", "   ")]);
        assert_eq!(source.get("A").as_deref(), Some("1"));
        assert_eq!(source.get("B"), None);
        assert_eq!(source.get("C"), None);

        source.set("C", " 3 ");
        assert_eq!(source.get("C").as_deref(), Some("3"));
        source.remove("C");
        assert_eq!(source.get("C"), None);
    }
}
