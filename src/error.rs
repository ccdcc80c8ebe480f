/// Hard failures while building a [`Logger`](crate::logger::Logger) or its
/// engine. No usable logger is returned alongside these.
#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    /// The engine output (file, stream) could not be opened.
    #[error("failed to open log output: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid logger configuration: {0}")]
    InvalidConfig(String),
}

/// Non-fatal configuration problems, returned next to a fully usable value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    #[error("service name not set, using {fallback:?}")]
    MissingServiceName { fallback: String },
}

/// Returned when a severity name cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown severity {0:?}")]
pub struct ParseSeverityError(pub String);

pub type Result<T, E = LoggerError> = std::result::Result<T, E>;
