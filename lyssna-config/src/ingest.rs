//! Event ingest configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Where the event stream comes from when not given on the command line.
#[derive(Default, Debug, Serialize, Deserialize, Validate, Clone)]
pub struct IngestConfig {
    /// Default input file of JSON-lines events; stdin when absent.
    #[serde(default)]
    pub input: Option<PathBuf>,

    /// Stop at the first malformed line instead of skipping it.
    #[serde(default)]
    pub strict: bool,
}
