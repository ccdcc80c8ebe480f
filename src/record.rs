use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseSeverityError;
use crate::field::{Field, CONTEXT_KEY, SOURCE_LOCATION_KEY};
use crate::report::report;
use crate::source::{locate, Frame};

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Name of the severity as Cloud Logging expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "fatal" | "emergency" => Ok(Severity::Fatal),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// One emission of a [`Logger`](crate::logger::Logger), as handed to a
/// [`LogEngine`](crate::engine::LogEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    /// Accumulated fields, then call-specific ones, then the labels group.
    pub fields: Vec<Field>,
    pub caller: Frame,
}

impl LogEntry {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().rev().find(|f| f.key == key).map(|f| &f.value)
    }
}

/// Process-wide parts of the rendered entry, owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub service_name: String,
    /// Attach an error report of the caller to every entry at `Error` or
    /// above that does not already carry a `context` field.
    pub report_all_errors: bool,
}

/// Render an entry as a single Cloud Logging JSON object.
///
/// Fields are applied in order, so a later field with the same name
/// replaces an earlier one. The message-level members come last and are
/// never shadowed by a field.
pub fn render_entry(entry: &LogEntry, options: &RenderOptions) -> Value {
    let mut out = Map::new();

    out.insert(SOURCE_LOCATION_KEY.to_string(), locate_value(&entry.caller));
    for field in &entry.fields {
        out.insert(field.key.clone(), field.value.clone());
    }

    if options.report_all_errors
        && entry.severity >= Severity::Error
        && !out.contains_key(CONTEXT_KEY)
    {
        let context = report(&entry.caller).field();
        out.insert(context.key, context.value);
    }

    out.insert("severity".into(), Value::from(entry.severity.as_str()));
    out.insert("message".into(), Value::from(entry.message.clone()));
    out.insert(
        "timestamp".into(),
        Value::from(entry.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)),
    );
    out.insert(
        "serviceContext".into(),
        serde_json::json!({ "service": options.service_name }),
    );

    Value::Object(out)
}

fn locate_value(frame: &Frame) -> Value {
    locate(frame).field().value
}
