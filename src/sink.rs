use crate::record::LogEntry;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`LogEntry`]s delivered by a
/// [`ChannelEngine`](crate::pipeline::ChannelEngine).
///
/// Implementations transport entries to a concrete backend (stdout, a log
/// agent, an ingestion API). The engine calls `send` from its background
/// task and never awaits it on the application thread.
#[async_trait]
pub trait EntrySink: Send + Sync {
    /// Send a single entry to the underlying backend.
    ///
    /// **Returns**
    /// - `Ok(())` if the entry was accepted by the backend.
    /// - `Err(..)` if the backend failed. The engine treats this as a
    ///   transient failure and retries the batch with backoff.
    async fn send(&self, entry: &LogEntry) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered entries, if the backend buffers.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
