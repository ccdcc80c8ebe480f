//! Environment variable names read by [`LoggerConfig::from_env`].
//!
//! [`LoggerConfig::from_env`]: crate::config::LoggerConfig::from_env

/// Service name injected by Cloud Run and Cloud Functions.
pub const SERVICE_NAME_ENV: &str = "K_SERVICE";

/// Minimum severity written, e.g. `info` or `warning`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// `stdout`, `stderr` or a file path.
pub const LOG_OUTPUT_ENV: &str = "LOG_OUTPUT";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
