//! Observability configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Dump Prometheus metrics to the log when an ingest run finishes.
    #[serde(default = "default_true")]
    pub dump_metrics: bool,
}

fn default_log_filter() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            dump_metrics: true,
        }
    }
}
