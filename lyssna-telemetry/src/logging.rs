//! Structured logging with `tracing`.

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Install the global subscriber; `RUST_LOG` wins over the default.
    pub fn init(default_filter: &str) {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_filter)),
            )
            .with_target(true)
            .init()
    }

    /// Emit the standard end-of-ingest summary line.
    pub fn log_ingest_summary(processed: u64, dropped: u64, connections: usize) {
        info!(processed, dropped, connections, "event ingest finished");
    }
}
