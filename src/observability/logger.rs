//! Structured JSON log records
//!
//! Every `tracing` event becomes one JSON object on one line:
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00.123Z","logger":"myapp::access","level":"INFO","message":"HTTP request completed","method":"GET","status":200}
//! ```
//!
//! The four fixed keys always come first and cannot be overridden by event
//! fields of the same name. Other fields keep their JSON types and their
//! declaration order. A declared field that records no value (`None`,
//! `field::Empty`) renders as `null`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const FIXED_KEYS: [&str; 4] = ["timestamp", "logger", "level", "message"];

/// One structured log record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// When the record was created
    pub timestamp: DateTime<Utc>,
    /// Logger name (the event target)
    pub logger: String,
    /// Severity
    pub level: Level,
    /// Human-readable message
    pub message: String,
    /// Structured fields, in the order they were recorded
    pub fields: Vec<(String, Value)>,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    pub fn new(level: Level, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            logger: logger.into(),
            level,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Add a structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Render as a single JSON line (without the trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = self
            .fields
            .iter()
            .filter(|(k, _)| !FIXED_KEYS.contains(&k.as_str()));

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(
            "timestamp",
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        map.serialize_entry("logger", &self.logger)?;
        map.serialize_entry("level", self.level.as_str())?;
        map.serialize_entry("message", &self.message)?;
        for (key, value) in extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Collects event fields into JSON values.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<&'static str, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
            return;
        }
        self.fields.insert(field.name(), value);
    }

    /// Recorded fields in declaration order, `null` where nothing was recorded.
    fn into_fields(mut self, event: &Event<'_>) -> Vec<(String, Value)> {
        event
            .metadata()
            .fields()
            .iter()
            .map(|field| field.name())
            // log-crate compatibility fields carry no useful payload here
            .filter(|name| *name != "message" && !name.starts_with("log."))
            .map(|name| {
                let value = self.fields.remove(name).unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
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
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}

/// `tracing-subscriber` event format producing [`LogRecord`] lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLogFormat;

impl<S, N> FormatEvent<S, N> for JsonLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor.message.take().unwrap_or_default();
        let record = LogRecord {
            timestamp: Utc::now(),
            logger: meta.target().to_string(),
            level: *meta.level(),
            message,
            fields: visitor.into_fields(event),
        };

        let line = record.to_json_line().map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}
