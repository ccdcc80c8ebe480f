use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Output, WriterEngine};
use crate::env::{env_or, LOG_LEVEL_ENV, LOG_OUTPUT_ENV, SERVICE_NAME_ENV};
use crate::error::{ConfigWarning, LoggerError, Result};
use crate::logger::Logger;
use crate::record::{RenderOptions, Severity};

/// Service name used when none was configured.
pub const FALLBACK_SERVICE_NAME: &str = "unknown-service";

/// Settings for the engine behind a root [`Logger`](crate::logger::Logger).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Rendered as `serviceContext.service`. Empty means "not configured".
    pub service_name: String,
    pub output: Output,
    pub min_severity: Severity,
    /// Attach an error report of the caller to entries at `Error` and above.
    pub report_all_errors: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            output: Output::Stdout,
            min_severity: Severity::Info,
            report_all_errors: true,
        }
    }
}

impl LoggerConfig {
    /// Read [`SERVICE_NAME_ENV`], [`LOG_LEVEL_ENV`] and [`LOG_OUTPUT_ENV`].
    /// Unset variables keep their defaults; an unparsable level is an error.
    pub fn from_env() -> Result<Self> {
        let mut config = LoggerConfig {
            service_name: env_or(SERVICE_NAME_ENV, ""),
            ..Default::default()
        };

        let level = env_or(LOG_LEVEL_ENV, "");
        if !level.trim().is_empty() {
            config.min_severity = level
                .parse()
                .map_err(|e| LoggerError::InvalidConfig(format!("{LOG_LEVEL_ENV}: {e}")))?;
        }
        config.output = Output::parse(&env_or(LOG_OUTPUT_ENV, ""));

        Ok(config)
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn with_report_all_errors(mut self, enabled: bool) -> Self {
        self.report_all_errors = enabled;
        self
    }

    /// Resolve the effective service name, substituting
    /// [`FALLBACK_SERVICE_NAME`] and warning when it is empty.
    pub fn render_options(&self) -> (RenderOptions, Option<ConfigWarning>) {
        let (service_name, warning) = if self.service_name.is_empty() {
            let fallback = FALLBACK_SERVICE_NAME.to_string();
            (fallback.clone(), Some(ConfigWarning::MissingServiceName { fallback }))
        } else {
            (self.service_name.clone(), None)
        };
        let options = RenderOptions { service_name, report_all_errors: self.report_all_errors };
        (options, warning)
    }

    /// Open the configured output and return a root logger writing to it.
    pub fn build(&self) -> Result<(Logger, Option<ConfigWarning>)> {
        let (options, warning) = self.render_options();
        let service_name = options.service_name.clone();
        let engine = WriterEngine::open(&self.output, options, self.min_severity)?;
        Ok((Logger::with_engine(Arc::new(engine), service_name), warning))
    }

    /// Root logger delivering through a [`ChannelEngine`] into `sink`.
    /// `output` is ignored. Must be called inside a Tokio runtime.
    ///
    /// [`ChannelEngine`]: crate::pipeline::ChannelEngine
    #[cfg(feature = "pipeline")]
    pub fn build_pipeline(
        &self,
        sink: Arc<dyn crate::sink::EntrySink>,
        pipeline: PipelineConfig,
    ) -> (Logger, Option<ConfigWarning>, tokio::task::JoinHandle<()>) {
        let (options, warning) = self.render_options();
        let service_name = options.service_name.clone();
        let (engine, handle) =
            crate::pipeline::ChannelEngine::new(sink, pipeline, options, self.min_severity);
        (Logger::with_engine(Arc::new(engine), service_name), warning, handle)
    }
}

/// Buffering and batching of a [`ChannelEngine`](crate::pipeline::ChannelEngine).
///
/// **Fields**
/// - `channel_buffer`: entries queued before new ones are dropped.
/// - `batch_size`: entries handed to the sink per delivery.
/// - `flush_interval`: longest wait before a partial batch is delivered.
/// - `max_retries`: retries of a failing batch before it is dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            max_retries: 5,
        }
    }
}

impl PipelineConfig {
    /// Enforce minimal thresholds to avoid degenerate configs.
    pub fn normalized(self) -> Self {
        Self {
            channel_buffer: self.channel_buffer.max(16),
            batch_size: self.batch_size.max(1),
            flush_interval: self.flush_interval.max(Duration::from_millis(10)),
            max_retries: self.max_retries,
        }
    }
}
