use crate::record::LogEntry;
use crate::sink::EntrySink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops all entries.
///
/// Useful for measuring the overhead of the logger and the pipeline
/// without any external I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl EntrySink for NoopSink {
    async fn send(&self, _entry: &LogEntry) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
