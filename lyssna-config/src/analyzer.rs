//! Analyzer configuration.
//!
//! Parameters for the event-correlation core: connection-table sizing and
//! the reporting cadence of the ingest loop.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Analyzer configuration parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct AnalyzerConfig {
    /// Warn once the connection table tracks more records than this.
    #[validate(range(min = 16, max = 50_000_000))]
    #[serde(default = "default_table_warn_threshold")]
    pub table_warn_threshold: usize,

    /// Log an ingest progress line every N processed events (0 disables).
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_table_warn_threshold() -> usize {
    100_000
}
fn default_progress_interval() -> u64 {
    10_000
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            table_warn_threshold: default_table_warn_threshold(),
            progress_interval: default_progress_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_default_analyzer_config() {
        let config = AnalyzerConfig::default();
        config.validate().expect("Default config should be valid");
    }

    #[test]
    fn invalid_threshold() {
        let mut config = AnalyzerConfig::default();
        config.table_warn_threshold = 1;
        assert!(config.validate().is_err());
    }
}
