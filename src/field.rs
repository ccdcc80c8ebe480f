use serde::Serialize;
use serde_json::{Map, Value};

/// Group name the backend lifts into the entry's labels.
pub const LABELS_KEY: &str = "labels";
/// Field carrying the [`HttpPayload`](crate::http_payload::HttpPayload).
pub const HTTP_REQUEST_KEY: &str = "httpRequest";
/// Field carrying an [`ErrorReport`](crate::report::ErrorReport).
pub const CONTEXT_KEY: &str = "context";
/// Field carrying the caller's [`SourceLocation`](crate::source::SourceLocation).
pub const SOURCE_LOCATION_KEY: &str = "logging.googleapis.com/sourceLocation";
/// Field carrying the description of a caller-supplied error.
pub const ERROR_KEY: &str = "error";

/// Message-level keys the backend or the engine assigns itself. Values
/// supplied for these through `with_field`/`with_fields` are dropped.
pub const RESERVED_KEYS: [&str; 7] = [
    "caller",
    "context",
    "error",
    "message",
    "serviceContext",
    "stacktrace",
    "timestamp",
];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// A single named value in the structured part of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

impl Field {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Field { key: key.into(), value }
    }

    /// Render any serializable value as a field.
    ///
    /// A value that cannot be represented as JSON (for example a map with
    /// non-string keys) becomes `null`; the failure is reported through
    /// `tracing`.
    pub fn any<V: Serialize + ?Sized>(key: impl Into<String>, value: &V) -> Self {
        let key = key.into();
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(field = %key, error = %e, "field value is not serializable, storing null");
                Value::Null
            }
        };
        Field { key, value }
    }

    /// One entry of the labels group.
    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Field { key: key.into(), value: Value::String(value.into()) }
    }

    /// Group label entries under [`LABELS_KEY`].
    pub fn labels(entries: &[Field]) -> Self {
        let group: Map<String, Value> = entries
            .iter()
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect();
        Field { key: LABELS_KEY.to_string(), value: Value::Object(group) }
    }

    /// The description of `err`, or an empty string when there is none.
    pub fn error(err: Option<&dyn std::error::Error>) -> Self {
        let text = err.map(|e| e.to_string()).unwrap_or_default();
        Field { key: ERROR_KEY.to_string(), value: Value::String(text) }
    }
}
