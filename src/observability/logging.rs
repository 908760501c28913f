//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem (filter, JSON layer, optional alerts)
//! - Render every event as one JSON line with a fixed key set
//! - Merge the per-request context into each line
//!
//! # Design Decisions
//! - Call sites use plain `tracing` macros; this module only formats
//! - Every schema key is always present (null when unknown)
//! - Unknown event fields are collected under `extra_context` and redacted
//! - Values that are not JSON-native fall back to their string rendering

use std::error::Error as StdError;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::ObservabilityConfig;
use crate::observability::alert::{spawn_alert_sink, AlertError, AlertLayer, AlertSink};
use crate::observability::context::{self, RequestContext};
use crate::observability::redact::Redactor;

/// Keys present on every log line, in schema order.
pub const LOG_FIELDS: &[&str] = &[
    "ts",
    "level",
    "logger",
    "msg",
    "request_id",
    "method",
    "path",
    "status",
    "duration_ms",
    "client_ip",
    "user_agent",
    "route",
    "db_time_ms",
    "error_type",
    "error",
    "stack",
    "extra_context",
];

/// Schema keys an event may set directly through its own fields.
const EVENT_FIELDS: &[&str] = &[
    "method",
    "path",
    "status",
    "duration_ms",
    "client_ip",
    "user_agent",
    "route",
    "db_time_ms",
    "error_type",
    "error",
];

/// Error type for logging initialization.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. When a webhook URL
/// is configured the alert sink worker is spawned on the current runtime and
/// its handle returned. An unusable webhook disables alerts with a warning.
pub fn init_logging(config: &ObservabilityConfig) -> Result<Option<AlertSink>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::default()
            .add_directive(parse_level(&config.log_level).into())
            .add_directive("hyper=warn".parse()?)
            .add_directive("reqwest=warn".parse()?),
    };

    let json_layer = JsonLogLayer::new(std::io::stdout, Redactor::new(&config.sensitive_fields));

    let (alert_layer, sink, alert_error) = match alert_sink(config) {
        Ok(Some((layer, sink))) => (Some(layer), Some(sink), None),
        Ok(None) => (None, None, None),
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(alert_layer)
        .try_init()?;

    if let Some(err) = alert_error {
        tracing::warn!(
            target: "alert_sink",
            error = &err as &(dyn StdError + 'static),
            "Alerts disabled"
        );
    }
    Ok(sink)
}

/// Alert sink for the configured webhook, if any.
fn alert_sink(config: &ObservabilityConfig) -> Result<Option<(AlertLayer, AlertSink)>, AlertError> {
    config
        .alert_webhook_url
        .as_deref()
        .map(|url| {
            spawn_alert_sink(
                url,
                Duration::from_millis(config.alert_timeout_ms),
                config.alert_queue_capacity,
            )
        })
        .transpose()
}

/// Parse a level name. Unknown names fall back to INFO.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "warning" => LevelFilter::WARN,
        "critical" | "fatal" => LevelFilter::ERROR,
        other => LevelFilter::from_str(other).unwrap_or(LevelFilter::INFO),
    }
}

/// Wrapper that records a serializable value as a JSON field.
///
/// ```ignore
/// tracing::info!(payload = ?Structured(&body), "request_start");
/// ```
pub struct Structured<T>(pub T);

impl<T: Serialize> fmt::Debug for Structured<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("\"<unserializable>\""),
        }
    }
}

/// Error attached to an event through `record_error`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttachedError {
    pub type_name: String,
    pub message: String,
    pub stack: String,
}

impl AttachedError {
    fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut stack = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\ncaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            type_name: error_type_name(err),
            message: err.to_string(),
            stack,
        }
    }
}

/// Leading identifier of the error's `Debug` rendering (the variant or struct
/// name for derived impls), `"Error"` when there is none.
fn error_type_name(err: &(dyn StdError + 'static)) -> String {
    let debug = format!("{err:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    let name = name.trim_end_matches(':');
    if name.is_empty() || !name.starts_with(|c: char| c.is_alphabetic()) {
        "Error".to_string()
    } else {
        name.to_string()
    }
}

/// Field visitor collecting an event's message, fields and attached error.
#[derive(Debug, Default)]
pub(crate) struct EventFields {
    pub message: Option<String>,
    pub fields: Map<String, Value>,
    pub error: Option<AttachedError>,
}

impl EventFields {
    pub fn from_event(event: &Event<'_>) -> Self {
        let mut fields = Self::default();
        event.record(&mut fields);
        fields
    }

    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EventFields {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn StdError + 'static)) {
        self.error = Some(AttachedError::from_error(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
            return;
        }
        let value = if text.starts_with('{') || text.starts_with('[') {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };
        self.insert(field, value);
    }
}

/// Assemble the JSON object for one event.
pub(crate) fn build_record(
    metadata: &Metadata<'_>,
    event: EventFields,
    ctx: &RequestContext,
    redactor: &Redactor,
    ts: DateTime<Utc>,
) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert(
        "ts".into(),
        Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    record.insert("level".into(), Value::String(metadata.level().to_string()));
    record.insert("logger".into(), Value::String(metadata.target().to_string()));
    record.insert(
        "msg".into(),
        Value::String(event.message.unwrap_or_default()),
    );
    record.insert(
        "request_id".into(),
        ctx.correlation_id()
            .map(|id| Value::String(id.to_string()))
            .unwrap_or(Value::Null),
    );

    for (key, value) in ctx.fields() {
        let vacant = record.get(key).map_or(true, Value::is_null);
        if vacant {
            record.insert(key.clone(), value.clone());
        }
    }

    if let Some(err) = event.error {
        record.insert("error_type".into(), Value::String(err.type_name));
        record.insert("error".into(), Value::String(err.message));
        record.insert("stack".into(), Value::String(err.stack));
    }

    let mut extra = Map::new();
    for (key, value) in event.fields {
        if EVENT_FIELDS.contains(&key.as_str()) {
            if !value.is_null() {
                record.insert(key, value);
            }
        } else if !record.contains_key(&key) {
            extra.insert(key, value);
        }
    }

    let extra_context = if extra.is_empty() {
        Value::Null
    } else {
        Value::Object(redactor.redact_map(&extra))
    };
    record.insert("extra_context".into(), extra_context);

    for field in LOG_FIELDS {
        record.entry(*field).or_insert(Value::Null);
    }
    record
}

/// Layer rendering events as single-line JSON objects.
pub struct JsonLogLayer<W> {
    make_writer: W,
    redactor: Redactor,
}

impl<W> JsonLogLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    pub fn new(make_writer: W, redactor: Redactor) -> Self {
        Self {
            make_writer,
            redactor,
        }
    }
}

impl<S, W> Layer<S> for JsonLogLayer<W>
where
    S: Subscriber,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let fields = EventFields::from_event(event);
        let record = build_record(
            event.metadata(),
            fields,
            &context::snapshot(),
            &self.redactor,
            Utc::now(),
        );

        let Ok(mut line) = serde_json::to_vec(&record) else {
            return;
        };
        line.push(b'\n');
        let mut writer = self.make_writer.make_writer_for(event.metadata());
        let _ = writer.write_all(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    struct BufferWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedBuffer {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            BufferWriter(Arc::clone(&self.0))
        }
    }

    impl io::Write for BufferWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().expect("lock output").clone();
            String::from_utf8(bytes)
                .expect("utf8 log output")
                .lines()
                .map(|l| serde_json::from_str(l).expect("json log line"))
                .collect()
        }
    }

    fn capture<F: FnOnce()>(f: F) -> Vec<Value> {
        let sink = SharedBuffer::default();
        let subscriber = tracing_subscriber::registry()
            .with(JsonLogLayer::new(sink.clone(), Redactor::default()));
        tracing::subscriber::with_default(subscriber, f);
        sink.lines()
    }

    #[derive(Debug, Error)]
    enum StoreError {
        #[error("connection refused")]
        Unreachable(#[source] io::Error),
    }

    #[test]
    fn test_every_schema_field_is_present() {
        let lines = capture(|| tracing::info!(target: "app.test", "hello"));
        let line = lines[0].as_object().unwrap();
        for field in LOG_FIELDS {
            assert!(line.contains_key(*field), "missing {field}");
        }
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["logger"], "app.test");
        assert_eq!(line["msg"], "hello");
        assert_eq!(line["request_id"], Value::Null);
        assert_eq!(line["extra_context"], Value::Null);
        let ts = line["ts"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn test_context_is_merged_and_event_fields_override() {
        let lines = capture(|| {
            context::sync_scope(|| {
                context::set_correlation_id("req-1");
                context::merge_field("path", "/from-context");
                context::merge_field("student_count", 12);
                tracing::info!(path = "/from-event", status = 201u16, "done");
            })
        });
        let line = &lines[0];
        assert_eq!(line["request_id"], "req-1");
        assert_eq!(line["path"], "/from-event");
        assert_eq!(line["status"], 201);
        assert_eq!(line["student_count"], 12);
    }

    #[test]
    fn test_extra_fields_are_redacted() {
        let lines = capture(|| {
            let payload = json!({"user": {"email": "x@y.z", "name": "n"}});
            tracing::info!(event = "request_start", payload = ?Structured(&payload), token = "abc", "start");
        });
        let extra = &lines[0]["extra_context"];
        assert_eq!(extra["event"], "request_start");
        assert_eq!(extra["token"], "[REDACTED]");
        assert_eq!(extra["payload"]["user"]["email"], "[REDACTED]");
        assert_eq!(extra["payload"]["user"]["name"], "n");
        assert!(!lines[0].to_string().contains("x@y.z"));
    }

    #[test]
    fn test_attached_error_fills_error_fields() {
        let err = StoreError::Unreachable(io::Error::new(io::ErrorKind::Other, "port closed"));
        let lines = capture(|| {
            tracing::error!(error = &err as &(dyn StdError + 'static), "database down");
            tracing::warn!("no error here");
        });

        assert_eq!(lines[0]["error_type"], "Unreachable");
        assert_eq!(lines[0]["error"], "connection refused");
        let stack = lines[0]["stack"].as_str().unwrap();
        assert!(stack.contains("caused by: port closed"));

        assert_eq!(lines[1]["error_type"], Value::Null);
        assert_eq!(lines[1]["error"], Value::Null);
        assert_eq!(lines[1]["stack"], Value::Null);
    }

    #[test]
    fn test_explicit_error_type_wins() {
        let err = io::Error::new(io::ErrorKind::Other, "boom");
        let lines = capture(|| {
            tracing::error!(error = &err as &(dyn StdError + 'static), error_type = "IoError", "failed");
        });
        assert_eq!(lines[0]["error_type"], "IoError");
        assert_eq!(lines[0]["error"], "boom");
    }

    #[test]
    fn test_non_json_values_fall_back_to_strings() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Opaque {
            id: u32,
        }
        let lines = capture(|| {
            tracing::info!(thing = ?Opaque { id: 3 }, ratio = f64::NAN, list = ?vec![1, 2], "mixed");
        });
        let extra = &lines[0]["extra_context"];
        assert_eq!(extra["thing"], "Opaque { id: 3 }");
        assert_eq!(extra["ratio"], "NaN");
        assert_eq!(extra["list"], json!([1, 2]));
    }

    #[tokio::test]
    async fn test_malformed_webhook_disables_alerts() {
        let config = ObservabilityConfig {
            alert_webhook_url: Some("not a url".to_string()),
            ..ObservabilityConfig::default()
        };
        assert!(matches!(alert_sink(&config), Err(AlertError::Url(_))));

        let config = ObservabilityConfig::default();
        assert!(alert_sink(&config).unwrap().is_none());
    }

    #[test]
    fn test_parse_level_fallback() {
        assert_eq!(parse_level("WARNING"), LevelFilter::WARN);
        assert_eq!(parse_level("debug"), LevelFilter::DEBUG);
        assert_eq!(parse_level("nonsense"), LevelFilter::INFO);
    }
}
