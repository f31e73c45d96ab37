//! # Lyssna Configuration System
//!
//! Hierarchical configuration for the lyssna analyzer: defaults, a YAML
//! file, and `LYSSNA_*` environment overrides, validated before use.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod analyzer;
mod error;
mod ingest;
mod telemetry;

pub use analyzer::AnalyzerConfig;
pub use error::ConfigError;
pub use ingest::IngestConfig;
pub use telemetry::TelemetryConfig;

/// Top-level configuration container for all lyssna components.
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
pub struct LyssnaConfig {
    /// Event-correlation core parameters.
    #[validate(nested)]
    pub analyzer: AnalyzerConfig,

    /// Event stream source parameters.
    #[validate(nested)]
    pub ingest: IngestConfig,

    /// Telemetry and observability configuration.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl LyssnaConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/lyssna.yaml` - base settings; defaults are used if missing.
    /// 3. `LYSSNA_*` environment variables (nested fields split on `__`).
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(LyssnaConfig::default()));

        if Path::new("config/lyssna.yaml").exists() {
            figment = figment.merge(Yaml::file("config/lyssna.yaml"));
        }

        figment
            .merge(Env::prefixed("LYSSNA_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(
                path.to_string_lossy().to_string(),
            )));
        }

        Figment::from(Serialized::defaults(LyssnaConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("LYSSNA_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_validation() {
        let config = LyssnaConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = LyssnaConfig::load_from_path("does/not/exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
