use std::sync::{Arc, Mutex};

use crate::engine::LogEngine;
use crate::record::{render_entry, LogEntry, RenderOptions};

/// In-memory engine that keeps every entry it receives.
///
/// Meant for tests: fatal entries are recorded like any other and the
/// process keeps running. Clones share the same storage.
#[derive(Clone, Default)]
pub struct CaptureEngine {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CaptureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Entries rendered the way [`WriterEngine`](crate::engine::WriterEngine)
    /// would write them.
    pub fn rendered(&self, options: &RenderOptions) -> Vec<serde_json::Value> {
        self.lock().iter().map(|e| render_entry(e, options)).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogEngine for CaptureEngine {
    fn log(&self, entry: LogEntry) {
        self.lock().push(entry);
    }
}
