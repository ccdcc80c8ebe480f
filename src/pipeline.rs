use std::error::Error;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};

use crate::config::PipelineConfig;
use crate::engine::LogEngine;
use crate::record::{render_entry, LogEntry, RenderOptions, Severity};
use crate::sink::EntrySink;

/// State shared between the engine and its background task.
///
/// The locks are only held for `try_recv`/`mem::take`, never across an
/// await, so the fatal path can take them from any thread.
struct Shared {
    receiver: Mutex<mpsc::Receiver<LogEntry>>,
    batch: Mutex<Vec<LogEntry>>,
    notify: Notify,
}

impl Shared {
    /// Move everything waiting in the channel into the batch. Returns the
    /// batch length and whether every sender is gone.
    fn pull(&self) -> (usize, bool) {
        let mut receiver = lock(&self.receiver);
        let mut batch = lock(&self.batch);
        loop {
            match receiver.try_recv() {
                Ok(entry) => batch.push(entry),
                Err(mpsc::error::TryRecvError::Empty) => return (batch.len(), false),
                Err(mpsc::error::TryRecvError::Disconnected) => return (batch.len(), true),
            }
        }
    }

    /// Entries not yet handed to the sink, oldest first.
    fn take_pending(&self) -> Vec<LogEntry> {
        self.pull();
        std::mem::take(&mut *lock(&self.batch))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`LogEngine`] that hands entries to an asynchronous [`EntrySink`] via a
/// bounded channel and a background batching task.
///
/// Application threads only pay for a `try_send`; when the channel is full
/// the entry is dropped and counted. A fatal entry is not queued: every
/// entry still in the channel or the unsent batch is written synchronously
/// to stderr, followed by the fatal entry, before the process exits.
/// Entries the task has already handed to the sink are left to it.
pub struct ChannelEngine {
    sender: Option<mpsc::Sender<LogEntry>>,
    shared: Arc<Shared>,
    options: RenderOptions,
    min_severity: Severity,
    /// Entries handed to [`LogEngine::log`]. A `Logger` checks
    /// [`LogEngine::enabled`] first, so entries below the minimum severity
    /// emitted through a `Logger` never get here.
    pub total_entries: Arc<AtomicU64>,
    /// Successfully enqueued into the channel.
    pub enqueued_entries: Arc<AtomicU64>,
    /// Dropped because the channel was full or the task is gone.
    pub dropped_entries: Arc<AtomicU64>,
    /// Accepted by the sink.
    pub delivered_entries: Arc<AtomicU64>,
}

impl ChannelEngine {
    /// Create the engine and spawn the task that batches entries into
    /// `sink`. Must be called inside a Tokio runtime.
    ///
    /// A batch is delivered when it reaches `batch_size` or on every tick
    /// of `flush_interval`, whichever comes first. The task ends, after a
    /// final flush, once the engine and every logger holding it have been
    /// dropped.
    pub fn new(
        sink: Arc<dyn EntrySink>,
        config: PipelineConfig,
        options: RenderOptions,
        min_severity: Severity,
    ) -> (Self, JoinHandle<()>) {
        let config = config.normalized();
        let (tx, rx) = mpsc::channel::<LogEntry>(config.channel_buffer);
        let shared = Arc::new(Shared {
            receiver: Mutex::new(rx),
            batch: Mutex::new(Vec::with_capacity(config.batch_size)),
            notify: Notify::new(),
        });

        let total_entries = Arc::new(AtomicU64::new(0));
        let enqueued_entries = Arc::new(AtomicU64::new(0));
        let dropped_entries = Arc::new(AtomicU64::new(0));
        let delivered_entries = Arc::new(AtomicU64::new(0));

        let shared_bg = Arc::clone(&shared);
        let delivered_bg = Arc::clone(&delivered_entries);
        let dropped_bg = Arc::clone(&dropped_entries);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + config.flush_interval, config.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let ticked = tokio::select! {
                    _ = shared_bg.notify.notified() => false,
                    _ = ticker.tick() => true,
                };

                let (ready, closed) = shared_bg.pull();
                if ticked || closed || ready >= config.batch_size {
                    let batch = std::mem::take(&mut *lock(&shared_bg.batch));
                    deliver(&*sink, batch, &config, &delivered_bg, &dropped_bg).await;
                }
                if closed {
                    if let Err(e) = sink.flush().await {
                        tracing::warn!(error = %e, "entry sink flush failed on shutdown");
                    }
                    break;
                }
            }
        });

        (ChannelEngine {
            sender: Some(tx),
            shared,
            options,
            min_severity,
            total_entries,
            enqueued_entries,
            dropped_entries,
            delivered_entries,
        }, handle)
    }

    /// Write every pending entry, then `entry`, as JSON lines to `out`.
    fn write_fatal(&self, entry: &LogEntry, out: &mut dyn Write) {
        let mut pending = self.shared.take_pending();
        pending.push(entry.clone());
        for queued in &pending {
            if let Err(e) = writeln!(out, "{}", render_entry(queued, &self.options)) {
                tracing::warn!(error = %e, "failed to write entry before exit");
            }
        }
        let _ = out.flush();
    }
}

impl Drop for ChannelEngine {
    fn drop(&mut self) {
        // Close the channel before waking the task so it sees the disconnect.
        self.sender.take();
        self.shared.notify.notify_one();
    }
}

async fn deliver(
    sink: &dyn EntrySink,
    batch: Vec<LogEntry>,
    config: &PipelineConfig,
    delivered: &AtomicU64,
    dropped: &AtomicU64,
) {
    for chunk in batch.chunks(config.batch_size) {
        let len = chunk.len() as u64;
        match send_batch(sink, chunk, config.max_retries).await {
            Ok(()) => {
                delivered.fetch_add(len, Ordering::Relaxed);
            }
            Err(e) => {
                dropped.fetch_add(len, Ordering::Relaxed);
                tracing::warn!(error = %e, entries = len, "giving up on log batch");
            }
        }
    }
}

/// Send every entry of `batch`, retrying the whole batch with exponential
/// backoff. Entries already accepted may be sent again on retry.
async fn send_batch(
    sink: &dyn EntrySink,
    batch: &[LogEntry],
    max_retries: u32,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(10);
    let mut attempt = 0;

    loop {
        let mut last_err: Option<Box<dyn Error + Send + Sync>> = None;
        for entry in batch {
            if let Err(e) = sink.send(entry).await {
                last_err = Some(e);
                break;
            }
        }

        match last_err {
            None => return Ok(()),
            Some(e) if attempt >= max_retries => return Err(e),
            Some(e) => {
                tracing::debug!(error = %e, ?backoff, "entry sink send failed, retrying");
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
                attempt += 1;
            }
        }
    }
}

impl LogEngine for ChannelEngine {
    fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    fn log(&self, entry: LogEntry) {
        self.total_entries.fetch_add(1, Ordering::Relaxed);
        if !self.enabled(entry.severity) {
            return;
        }

        if entry.severity == Severity::Fatal {
            self.write_fatal(&entry, &mut std::io::stderr().lock());
            std::process::exit(1);
        }

        let sent = match &self.sender {
            Some(sender) => sender.try_send(entry).is_ok(),
            None => false,
        };
        if sent {
            self.enqueued_entries.fetch_add(1, Ordering::Relaxed);
            self.shared.notify.notify_one();
        } else {
            self.dropped_entries.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("log channel full, dropping entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::logger::Logger;
    use crate::source::Frame;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct CollectSink {
        entries: Mutex<Vec<LogEntry>>,
        flushed: AtomicU32,
    }

    impl CollectSink {
        fn messages(&self) -> Vec<String> {
            self.entries.lock().unwrap().iter().map(|e| e.message.clone()).collect()
        }
    }

    #[async_trait]
    impl EntrySink for CollectSink {
        async fn send(&self, entry: &LogEntry) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.flushed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Fails the first `failures` sends.
    struct FlakySink {
        failures: AtomicU32,
        sent: AtomicU32,
    }

    #[async_trait]
    impl EntrySink for FlakySink {
        async fn send(&self, _entry: &LogEntry) -> Result<(), Box<dyn Error + Send + Sync>> {
            if self.failures.load(Ordering::Relaxed) > 0 {
                self.failures.fetch_sub(1, Ordering::Relaxed);
                return Err("unavailable".into());
            }
            self.sent.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn entry(severity: Severity, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            fields: vec![Field::label("n", message)],
            caller: Frame::caller(),
        }
    }

    fn options() -> RenderOptions {
        RenderOptions { service_name: "svc".into(), report_all_errors: true }
    }

    #[tokio::test]
    async fn delivers_everything_on_shutdown() {
        let sink = Arc::new(CollectSink::default());
        let config = PipelineConfig { batch_size: 100, ..Default::default() };
        let (engine, handle) = ChannelEngine::new(sink.clone(), config, options(), Severity::Info);

        for i in 0..10 {
            engine.log(entry(Severity::Info, &i.to_string()));
        }
        engine.log(entry(Severity::Debug, "filtered"));

        let delivered = Arc::clone(&engine.delivered_entries);
        assert_eq!(engine.total_entries.load(Ordering::Relaxed), 11);
        assert_eq!(engine.enqueued_entries.load(Ordering::Relaxed), 10);
        drop(engine);
        handle.await.unwrap();

        assert_eq!(sink.messages(), ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
        assert_eq!(delivered.load(Ordering::Relaxed), 10);
        assert_eq!(sink.flushed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn partial_batch_flushes_under_steady_traffic() {
        let sink = Arc::new(CollectSink::default());
        let config = PipelineConfig {
            batch_size: 100,
            flush_interval: Duration::from_millis(50),
            ..Default::default()
        };
        let (engine, handle) = ChannelEngine::new(sink.clone(), config, options(), Severity::Info);

        for i in 0..25 {
            engine.log(entry(Severity::Info, &i.to_string()));
            sleep(Duration::from_millis(20)).await;
        }

        let delivered_before_shutdown = sink.messages().len();
        assert!(
            delivered_before_shutdown > 0,
            "nothing delivered while entries kept arriving faster than the flush interval"
        );

        drop(engine);
        handle.await.unwrap();
        assert_eq!(sink.messages().len(), 25);
    }

    #[tokio::test]
    async fn full_batch_is_delivered_without_waiting_for_tick() {
        let sink = Arc::new(CollectSink::default());
        let config = PipelineConfig {
            batch_size: 2,
            flush_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let (engine, handle) = ChannelEngine::new(sink.clone(), config, options(), Severity::Info);

        engine.log(entry(Severity::Info, "a"));
        engine.log(entry(Severity::Info, "b"));
        for _ in 0..50 {
            if sink.messages().len() == 2 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.messages(), ["a", "b"]);

        drop(engine);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn fatal_writes_queued_entries_first() {
        let sink = Arc::new(CollectSink::default());
        let config = PipelineConfig {
            batch_size: 100,
            flush_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let (engine, handle) = ChannelEngine::new(sink.clone(), config, options(), Severity::Info);

        engine.log(entry(Severity::Info, "request accepted"));
        engine.log(entry(Severity::Error, "db down"));

        let mut out = Vec::new();
        engine.write_fatal(&entry(Severity::Fatal, "giving up"), &mut out);

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let messages: Vec<_> = lines.iter().map(|l| l["message"].as_str().unwrap()).collect();
        assert_eq!(messages, ["request accepted", "db down", "giving up"]);
        assert_eq!(lines[2]["severity"], "EMERGENCY");

        drop(engine);
        handle.await.unwrap();
        assert!(sink.messages().is_empty(), "entries written before exit are not sent twice");
    }

    #[tokio::test]
    async fn logger_skips_engine_below_minimum() {
        let sink = Arc::new(CollectSink::default());
        let (engine, handle) =
            ChannelEngine::new(sink.clone(), PipelineConfig::default(), options(), Severity::Info);
        let total = Arc::clone(&engine.total_entries);
        let enqueued = Arc::clone(&engine.enqueued_entries);

        let logger = Logger::with_engine(Arc::new(engine), "svc");
        logger.debug("filtered by the logger");
        logger.info("kept");

        assert_eq!(total.load(Ordering::Relaxed), 1);
        assert_eq!(enqueued.load(Ordering::Relaxed), 1);

        drop(logger);
        handle.await.unwrap();
        assert_eq!(sink.messages(), ["kept"]);
    }

    #[tokio::test]
    async fn retries_failed_batches() {
        let sink = Arc::new(FlakySink { failures: AtomicU32::new(2), sent: AtomicU32::new(0) });
        let config = PipelineConfig { batch_size: 1, max_retries: 3, ..Default::default() };
        let (engine, handle) = ChannelEngine::new(sink.clone(), config, options(), Severity::Info);

        engine.log(entry(Severity::Error, "boom"));
        drop(engine);
        handle.await.unwrap();

        assert_eq!(sink.sent.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let sink = Arc::new(FlakySink { failures: AtomicU32::new(10), sent: AtomicU32::new(0) });
        let config = PipelineConfig { batch_size: 1, max_retries: 1, ..Default::default() };
        let (engine, handle) = ChannelEngine::new(sink.clone(), config, options(), Severity::Info);

        engine.log(entry(Severity::Error, "boom"));
        let dropped = Arc::clone(&engine.dropped_entries);
        drop(engine);
        handle.await.unwrap();

        assert_eq!(sink.sent.load(Ordering::Relaxed), 0);
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
    }
}
