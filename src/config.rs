//! Run configuration.
//!
//! Settings for a single simulator run, loadable from a JSON file:
//!
//! ```
//! use lc3mini::config::{RunConfig, DumpFormat};
//!
//! let json = r#"{ "max_cycles": 1000, "dump": "text" }"#;
//! let config = RunConfig::from_json(json).unwrap();
//! assert_eq!(config.max_cycles, Some(1000));
//! assert_eq!(config.dump, DumpFormat::Text);
//! assert!(!config.trace);
//! ```
//!
//! Every field is optional; command-line flags override file values.

use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// How to print machine state after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    /// No dump
    #[default]
    None,
    /// Bit-string register and memory listing
    Text,
    /// JSON snapshot
    Json,
}

/// Settings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Stop after this many instructions (unbounded if unset)
    #[serde(default)]
    pub max_cycles: Option<u64>,

    /// Log every executed instruction
    #[serde(default)]
    pub trace: bool,

    /// State dump printed when the run ends
    #[serde(default)]
    pub dump: DumpFormat,
}

impl RunConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), message: e.to_string() })?;
        Self::from_json(&text)
    }

    /// Apply command-line overrides. Unset flags keep the file's value.
    pub fn with_overrides(mut self, max_cycles: Option<u64>, trace: bool, dump: Option<DumpFormat>) -> Self {
        if max_cycles.is_some() {
            self.max_cycles = max_cycles;
        }
        self.trace |= trace;
        if let Some(dump) = dump {
            self.dump = dump;
        }
        self
    }
}

/// Errors loading a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid config: {0}")]
    Parse(String),
}
