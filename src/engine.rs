use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::Result;
use crate::record::{render_entry, LogEntry, RenderOptions, Severity};

/// The leveled engine a [`Logger`](crate::logger::Logger) writes through.
///
/// A logger and all contexts derived from it share one engine; concurrent
/// calls to [`log`](LogEngine::log) must be safe. Engines terminate the
/// process after writing a [`Severity::Fatal`] entry unless documented
/// otherwise.
pub trait LogEngine: Send + Sync {
    /// Whether entries at `severity` would be written at all.
    fn enabled(&self, _severity: Severity) -> bool {
        true
    }

    /// Write a fully assembled entry.
    fn log(&self, entry: LogEntry);
}

/// Destination of a [`WriterEngine`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Output {
    #[default]
    Stdout,
    Stderr,
    /// Appended to, created if missing.
    File(PathBuf),
}

impl Output {
    /// `stdout`, `stderr`, anything else is a file path.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "stdout" => Output::Stdout,
            "stderr" => Output::Stderr,
            path => Output::File(PathBuf::from(path)),
        }
    }

    fn open(&self) -> io::Result<Box<dyn Write + Send>> {
        let writer: Box<dyn Write + Send> = match self {
            Output::Stdout => Box::new(io::stdout()),
            Output::Stderr => Box::new(io::stderr()),
            Output::File(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
        };
        Ok(writer)
    }
}

/// Synchronous engine writing one JSON object per line.
pub struct WriterEngine {
    writer: Mutex<Box<dyn Write + Send>>,
    options: RenderOptions,
    min_severity: Severity,
}

impl WriterEngine {
    /// Open `output` and build the engine. Failing to open the output is
    /// the only way engine construction fails.
    pub fn open(output: &Output, options: RenderOptions, min_severity: Severity) -> Result<Self> {
        let writer = output.open()?;
        Ok(Self::from_writer(writer, options, min_severity))
    }

    pub fn from_writer(
        writer: Box<dyn Write + Send>,
        options: RenderOptions,
        min_severity: Severity,
    ) -> Self {
        WriterEngine { writer: Mutex::new(writer), options, min_severity }
    }

    fn write_line(&self, entry: &LogEntry) -> io::Result<()> {
        let mut line = serde_json::to_vec(&render_entry(entry, &self.options))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(&line)?;
        writer.flush()
    }
}

impl LogEngine for WriterEngine {
    fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    fn log(&self, entry: LogEntry) {
        if !self.enabled(entry.severity) {
            return;
        }
        if let Err(e) = self.write_line(&entry) {
            tracing::warn!(error = %e, "failed to write log entry");
        }
        if entry.severity == Severity::Fatal {
            std::process::exit(1);
        }
    }
}
