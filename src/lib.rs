//! Immutable, chainable logger context for Cloud Logging structured output.
//!
//! A root [`logger::Logger`] is built once; `with_label`/`with_field` derive
//! independent child loggers that carry extra context into every entry.
//! [`source`], [`report`] and [`http_payload`] build the `sourceLocation`,
//! `context.reportLocation` and `httpRequest` groups the backend knows.

pub mod error;
pub mod field;
pub mod source;
pub mod report;
pub mod http_payload;
pub mod record;
pub mod engine;
pub mod capture;
pub mod env;
pub mod config;
pub mod logger;

#[cfg(feature = "pipeline")]
pub mod sink;
#[cfg(feature = "pipeline")]
pub mod pipeline;
#[cfg(feature = "pipeline")]
pub mod noop_sink;
#[cfg(feature = "pipeline")]
pub mod stdout_sink;
