use crate::record::{render_entry, LogEntry, RenderOptions};
use crate::sink::EntrySink;
use async_trait::async_trait;
use std::error::Error;
use tokio::io::{stdout, AsyncWriteExt};
use tokio::sync::Mutex;

/// Writes each entry as a JSON line to the process's standard output,
/// where the Cloud Run / Cloud Functions agent picks it up.
pub struct StdoutSink {
    options: RenderOptions,
    out: Mutex<tokio::io::Stdout>,
}

impl StdoutSink {
    pub fn new(options: RenderOptions) -> Self {
        StdoutSink { options, out: Mutex::new(stdout()) }
    }
}

#[async_trait]
impl EntrySink for StdoutSink {
    async fn send(&self, entry: &LogEntry) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut line = serde_json::to_vec(&render_entry(entry, &self.options))?;
        line.push(b'\n');
        self.out.lock().await.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.out.lock().await.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::record::Severity;
    use crate::source::Frame;
    use chrono::Utc;

    #[tokio::test]
    async fn writes_and_flushes() {
        let sink = StdoutSink::new(RenderOptions { service_name: "svc".into(), report_all_errors: false });
        let entry = LogEntry {
            timestamp: Utc::now(),
            severity: Severity::Info,
            message: "to stdout".into(),
            fields: vec![Field::labels(&[])],
            caller: Frame::caller(),
        };
        sink.send(&entry).await.unwrap();
        sink.flush().await.unwrap();
    }
}
