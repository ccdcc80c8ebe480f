use std::sync::Arc;
use std::time::Instant;

use gcp_log_context::config::{LoggerConfig, PipelineConfig};
use gcp_log_context::noop_sink::NoopSink;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let sink = Arc::new(NoopSink::default());
    let config = LoggerConfig::default().with_service_name("load-test");
    let (root, _, handle) = config.build_pipeline(sink, PipelineConfig::default());

    let n: u64 = 100_000;
    let start = Instant::now();

    let logger = root.with_label("run", "default");
    for i in 0..n {
        logger.with_field("iteration", i).info("load test entry");
    }

    let elapsed = start.elapsed();
    println!(
        "logged {} entries in {:?} (~{:.0} entries/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    drop(logger);
    drop(root);
    let _ = handle.await;
}
