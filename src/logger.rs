use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::config::LoggerConfig;
use crate::engine::LogEngine;
use crate::error::{ConfigWarning, Result};
use crate::field::{is_reserved_key, Field};
use crate::record::{LogEntry, Severity};
use crate::source::Frame;

/// Immutable logging context.
///
/// A `Logger` carries accumulated labels (grouped under `labels` in every
/// entry) and fields (merged into the entry's top level). Every `with_*`
/// call returns a new, independent `Logger`; the receiver and any siblings
/// derived from it are never affected. All loggers derived from one root
/// share its engine.
///
/// Field keys listed in [`RESERVED_KEYS`](crate::field::RESERVED_KEYS) are
/// silently ignored by `with_field`/`with_fields`.
#[derive(Clone)]
pub struct Logger {
    engine: Arc<dyn LogEngine>,
    service_name: Arc<str>,
    label_map: BTreeMap<String, String>,
    label_list: Vec<Field>,
    field_map: BTreeMap<String, Value>,
    field_list: Vec<Field>,
}

impl Logger {
    /// Root logger writing JSON lines to stdout for `service_name`.
    ///
    /// An empty name is replaced by
    /// [`FALLBACK_SERVICE_NAME`](crate::config::FALLBACK_SERVICE_NAME) and
    /// reported as a warning next to the still usable logger.
    pub fn new(service_name: &str) -> Result<(Logger, Option<ConfigWarning>)> {
        LoggerConfig::default().with_service_name(service_name).build()
    }

    /// Root logger configured from the environment, see
    /// [`LoggerConfig::from_env`].
    pub fn from_env() -> Result<(Logger, Option<ConfigWarning>)> {
        LoggerConfig::from_env()?.build()
    }

    /// Root logger over a caller-provided engine.
    pub fn with_engine(engine: Arc<dyn LogEngine>, service_name: impl Into<String>) -> Logger {
        Logger {
            engine,
            service_name: Arc::from(service_name.into()),
            label_map: BTreeMap::new(),
            label_list: Vec::new(),
            field_map: BTreeMap::new(),
            field_list: Vec::new(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.label_map
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.field_map
    }

    /// Labels as rendered entries, one per key, sorted by key.
    pub fn label_list(&self) -> &[Field] {
        &self.label_list
    }

    /// Fields as rendered entries, sorted by key.
    pub fn field_list(&self) -> &[Field] {
        &self.field_list
    }

    pub fn with_label(&self, key: impl Into<String>, value: impl Into<String>) -> Logger {
        let mut label_map = self.label_map.clone();
        label_map.insert(key.into(), value.into());
        self.derive_labels(label_map)
    }

    pub fn with_labels<I, K, V>(&self, labels: I) -> Logger
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut label_map = self.label_map.clone();
        label_map.extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self.derive_labels(label_map)
    }

    /// Add a field. A reserved key leaves the existing value, if any, as is.
    pub fn with_field<V: Serialize>(&self, key: impl Into<String>, value: V) -> Logger {
        self.with_fields([(key, value)])
    }

    pub fn with_fields<I, K, V>(&self, fields: I) -> Logger
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let mut field_map = self.field_map.clone();
        for (key, value) in fields {
            let key = key.into();
            if is_reserved_key(&key) {
                continue;
            }
            let field = Field::any(key, &value);
            field_map.insert(field.key, field.value);
        }
        self.derive_fields(field_map)
    }

    /// Add a pre-rendered field such as [`HttpPayload::field`], subject to
    /// the same reserved-key rule as [`with_field`](Logger::with_field).
    ///
    /// [`HttpPayload::field`]: crate::http_payload::HttpPayload::field
    pub fn with_structured_field(&self, field: Field) -> Logger {
        let mut field_map = self.field_map.clone();
        if !is_reserved_key(&field.key) {
            field_map.insert(field.key, field.value);
        }
        self.derive_fields(field_map)
    }

    fn derive_labels(&self, label_map: BTreeMap<String, String>) -> Logger {
        Logger {
            engine: Arc::clone(&self.engine),
            service_name: Arc::clone(&self.service_name),
            label_list: render_labels(&label_map),
            label_map,
            field_map: self.field_map.clone(),
            field_list: self.field_list.clone(),
        }
    }

    fn derive_fields(&self, field_map: BTreeMap<String, Value>) -> Logger {
        Logger {
            engine: Arc::clone(&self.engine),
            service_name: Arc::clone(&self.service_name),
            label_map: self.label_map.clone(),
            label_list: self.label_list.clone(),
            field_list: render_fields(&field_map),
            field_map,
        }
    }

    #[track_caller]
    pub fn debug(&self, message: &str) {
        self.emit(Severity::Debug, message, None, Vec::new(), Frame::caller());
    }

    #[track_caller]
    pub fn info(&self, message: &str) {
        self.emit(Severity::Info, message, None, Vec::new(), Frame::caller());
    }

    #[track_caller]
    pub fn warn(&self, message: &str) {
        self.emit(Severity::Warning, message, None, Vec::new(), Frame::caller());
    }

    /// Emit at error severity with an `error` field holding the
    /// description of `err` (empty when `None`).
    #[track_caller]
    pub fn error(&self, message: &str, err: Option<&dyn Error>) {
        self.emit(Severity::Error, message, Some(Field::error(err)), Vec::new(), Frame::caller());
    }

    /// Like [`error`](Logger::error) at fatal severity. The engine is
    /// expected to end the process once the entry is written; an engine
    /// that does not (such as [`CaptureEngine`](crate::capture::CaptureEngine))
    /// lets this return.
    #[track_caller]
    pub fn fatal(&self, message: &str, err: Option<&dyn Error>) {
        self.emit(Severity::Fatal, message, Some(Field::error(err)), Vec::new(), Frame::caller());
    }

    #[track_caller]
    pub fn infof(&self, args: fmt::Arguments<'_>) {
        self.emit(Severity::Info, &args.to_string(), None, Vec::new(), Frame::caller());
    }

    #[track_caller]
    pub fn warnf(&self, args: fmt::Arguments<'_>) {
        self.emit(Severity::Warning, &args.to_string(), None, Vec::new(), Frame::caller());
    }

    #[track_caller]
    pub fn errorf(&self, err: Option<&dyn Error>, args: fmt::Arguments<'_>) {
        let message = args.to_string();
        self.emit(Severity::Error, &message, Some(Field::error(err)), Vec::new(), Frame::caller());
    }

    #[track_caller]
    pub fn fatalf(&self, err: Option<&dyn Error>, args: fmt::Arguments<'_>) {
        let message = args.to_string();
        self.emit(Severity::Fatal, &message, Some(Field::error(err)), Vec::new(), Frame::caller());
    }

    /// Emit with call-specific fields that only apply to this entry.
    ///
    /// `extra` is not checked against the reserved keys, which is how an
    /// [`ErrorReport`](crate::report::ErrorReport) under `context` is
    /// passed. The `error` field is added when `err` is given or the
    /// severity is `Error` or above.
    #[track_caller]
    pub fn log(
        &self,
        severity: Severity,
        message: &str,
        err: Option<&dyn Error>,
        extra: impl IntoIterator<Item = Field>,
    ) {
        let error = (err.is_some() || severity >= Severity::Error).then(|| Field::error(err));
        self.emit(severity, message, error, extra.into_iter().collect(), Frame::caller());
    }

    fn emit(
        &self,
        severity: Severity,
        message: &str,
        error: Option<Field>,
        extra: Vec<Field>,
        caller: Frame,
    ) {
        if !self.engine.enabled(severity) {
            return;
        }

        let mut fields = Vec::with_capacity(self.field_list.len() + extra.len() + 2);
        fields.extend(self.field_list.iter().cloned());
        fields.extend(error);
        fields.extend(extra);
        fields.push(Field::labels(&self.label_list));

        self.engine.log(LogEntry {
            timestamp: Utc::now(),
            severity,
            message: message.to_string(),
            fields,
            caller,
        });
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("service_name", &self.service_name)
            .field("labels", &self.label_map)
            .field("fields", &self.field_map)
            .finish_non_exhaustive()
    }
}

fn render_labels(label_map: &BTreeMap<String, String>) -> Vec<Field> {
    label_map.iter().map(|(k, v)| Field::label(k.clone(), v.clone())).collect()
}

fn render_fields(field_map: &BTreeMap<String, Value>) -> Vec<Field> {
    field_map.iter().map(|(k, v)| Field::new(k.clone(), v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureEngine;
    use crate::field::RESERVED_KEYS;
    use crate::http_payload::{HttpPayload, HttpRequest};
    use crate::report::report;
    use serde_json::json;
    use std::collections::HashMap;

    fn root() -> (Logger, CaptureEngine) {
        let capture = CaptureEngine::new();
        (Logger::with_engine(Arc::new(capture.clone()), "test-service"), capture)
    }

    #[test]
    fn sibling_labels_are_independent() {
        let (root, _) = root();
        let a = root.with_label("a", "1");
        let b = root.with_label("a", "2");

        assert!(root.labels().is_empty());
        assert!(root.label_list().is_empty());
        assert_eq!(a.labels().get("a").map(String::as_str), Some("1"));
        assert_eq!(b.labels().get("a").map(String::as_str), Some("2"));
        assert_eq!(a.label_list(), [Field::label("a", "1")]);
    }

    #[test]
    fn deriving_from_child_leaves_parent_untouched() {
        let (root, _) = root();
        let parent = root.with_label("env", "prod").with_field("user", "u-1");
        let child = parent.with_label("env", "dev").with_field("user", "u-2").with_field("extra", 1);

        assert_eq!(parent.labels()["env"], "prod");
        assert_eq!(parent.fields()["user"], json!("u-1"));
        assert!(!parent.fields().contains_key("extra"));
        assert_eq!(child.labels()["env"], "dev");
        assert_eq!(child.fields()["user"], json!("u-2"));
    }

    #[test]
    fn labels_and_fields_carry_over() {
        let (root, _) = root();
        let logger = root.with_label("team", "core").with_field("n", 3).with_label("env", "prod");

        assert_eq!(logger.fields()["n"], json!(3));
        assert_eq!(logger.field_list(), [Field::new("n", json!(3))]);
        assert_eq!(
            logger.label_list(),
            [Field::label("env", "prod"), Field::label("team", "core")]
        );
    }

    #[test]
    fn reserved_field_keys_are_ignored() {
        let (root, capture) = root();
        for key in RESERVED_KEYS {
            let logger = root.with_field(key, "anything");
            assert!(logger.fields().is_empty(), "{key} was accepted");
        }

        let mut fields = HashMap::new();
        fields.insert("error", json!("hijack"));
        fields.insert("message", json!("hijack"));
        fields.insert("order", json!(17));
        let logger = root.with_fields(fields);
        assert_eq!(logger.fields().len(), 1);
        assert_eq!(logger.fields()["order"], json!(17));

        logger.info("hello");
        let entries = capture.entries();
        assert_eq!(entries[0].field("error"), None);
        assert_eq!(entries[0].message, "hello");
    }

    #[test]
    fn reserved_key_keeps_existing_fields() {
        let (root, _) = root();
        let logger = root.with_field("user", "u-1").with_fields([("context", "x"), ("user", "u-2")]);
        assert_eq!(logger.fields().len(), 1);
        assert_eq!(logger.fields()["user"], json!("u-2"));
    }

    #[test]
    fn empty_labels_rederive_equal() {
        let (root, _) = root();
        let parent = root.with_label("a", "1");
        let child = parent.with_labels(Vec::<(String, String)>::new());

        assert_eq!(child.labels(), parent.labels());
        assert_eq!(child.label_list(), parent.label_list());
        assert_ne!(child.label_list().as_ptr(), parent.label_list().as_ptr());
    }

    #[test]
    fn info_emits_fields_then_labels_group() {
        let (root, capture) = root();
        root.with_label("env", "prod").with_field("user", "u-1").info("served");

        let entries = capture.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.severity, Severity::Info);
        assert_eq!(
            entry.fields,
            vec![
                Field::new("user", json!("u-1")),
                Field::new("labels", json!({"env": "prod"})),
            ]
        );
    }

    #[test]
    fn error_carries_description() {
        let (root, capture) = root();
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such order");
        root.error("lookup failed", Some(&err));
        root.error("no cause", None);
        root.fatal("giving up", Some(&err));

        let entries = capture.entries();
        assert_eq!(entries[0].severity, Severity::Error);
        assert_eq!(entries[0].field("error"), Some(&json!("no such order")));
        assert_eq!(entries[1].field("error"), Some(&json!("")));
        assert_eq!(entries[2].severity, Severity::Fatal);
        assert_eq!(entries[2].field("labels"), Some(&json!({})));
    }

    #[test]
    fn formatting_variants() {
        let (root, capture) = root();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "quota exhausted");
        root.infof(format_args!("{} items in {}ms", 3, 12));
        root.errorf(None, format_args!("retry {}", 2));
        root.warnf(format_args!("slow by {}ms", 40));
        root.fatalf(Some(&err), format_args!("stopping after {} attempts", 5));

        let entries = capture.entries();
        assert_eq!(entries[0].message, "3 items in 12ms");
        assert_eq!(entries[0].field("error"), None);
        assert_eq!(entries[1].message, "retry 2");
        assert_eq!(entries[1].severity, Severity::Error);
        assert_eq!(entries[1].field("error"), Some(&json!("")));
        assert_eq!(entries[2].message, "slow by 40ms");
        assert_eq!(entries[2].severity, Severity::Warning);
        assert_eq!(entries[2].field("error"), None);
        assert_eq!(entries[3].message, "stopping after 5 attempts");
        assert_eq!(entries[3].severity, Severity::Fatal);
        assert_eq!(entries[3].field("error"), Some(&json!("quota exhausted")));
        assert_eq!(entries[3].field("labels"), Some(&json!({})));
    }

    #[test]
    fn caller_is_the_call_site() {
        let (root, capture) = root();
        let line = line!() + 1;
        root.info("here");

        let caller = &capture.entries()[0].caller;
        assert_eq!(caller.line, line);
        assert!(caller.file.ends_with("logger.rs"));
    }

    #[test]
    fn extra_fields_bypass_reserved_keys() {
        let (root, capture) = root();
        let context = report(&crate::frame!()).field();
        root.log(Severity::Warning, "with report", None, [context.clone()]);

        let entry = &capture.entries()[0];
        assert_eq!(entry.field("context"), Some(&context.value));
        assert_eq!(entry.field("error"), None);
    }

    #[test]
    fn structured_payload_field() {
        let (root, _) = root();
        let payload = HttpPayload::new(Some(HttpRequest { method: "GET".into(), ..Default::default() }), None);
        let logger = root.with_structured_field(payload.field());
        assert_eq!(logger.fields()["httpRequest"]["requestMethod"], json!("GET"));

        let blocked = root.with_structured_field(report(&Frame::default()).field());
        assert!(blocked.fields().is_empty());
    }

    #[test]
    fn derived_loggers_share_service_name() {
        let (root, _) = root();
        assert_eq!(root.with_label("a", "b").service_name(), "test-service");
    }

    #[test]
    fn concurrent_children_do_not_interfere() {
        let (root, capture) = root();
        let base = root.with_label("base", "yes");

        std::thread::scope(|s| {
            for i in 0..4 {
                let base = &base;
                s.spawn(move || {
                    let child = base.with_label("worker", i.to_string());
                    child.info("working");
                });
            }
        });

        assert_eq!(base.labels().len(), 1);
        let mut workers: Vec<_> = capture
            .entries()
            .iter()
            .map(|e| e.field("labels").unwrap()["worker"].as_str().unwrap().to_string())
            .collect();
        workers.sort();
        assert_eq!(workers, ["0", "1", "2", "3"]);
    }
}
