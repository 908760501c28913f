//! Sensitive field redaction.
//!
//! Keys are matched case-insensitively by name only; values are never
//! inspected. A matched key has its whole value replaced, whatever its type.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Placeholder written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Field names redacted when nothing else is configured.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &["password", "token", "email", "phone"];

/// Redaction policy: a set of lower-cased field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redactor {
    fields: HashSet<String>,
}

impl Redactor {
    /// Build a policy from field names. Blank names are ignored.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = fields
            .into_iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        Self { fields }
    }

    /// Build a policy from a comma-separated list (`"password,token"`).
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Whether `key` names a sensitive field.
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.fields.contains(&key.to_lowercase())
    }

    /// Return a redacted copy of `value`.
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact_map(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            scalar => scalar.clone(),
        }
    }

    /// Return a redacted copy of an object.
    pub fn redact_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let value = if self.is_sensitive(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    self.redact(value)
                };
                (key.clone(), value)
            })
            .collect()
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_FIELDS)
    }
}

/// Redact `value` against an explicit list of field names.
pub fn redact<S: AsRef<str>>(value: &Value, field_names: &[S]) -> Value {
    Redactor::new(field_names).redact(value)
}
