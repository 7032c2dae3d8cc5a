//! Serializable batch configuration.
//!
//! Every path the batch touches comes from here; nothing reads globals.
//! Example:
//!
//! ```toml
//! min_observations = 60
//!
//! [source]
//! train_csv = "data/train.csv"
//! store_csv = "data/store.csv"
//!
//! [output]
//! dir = "output"
//!
//! [forecast]
//! horizon = 30
//! exog_policy = "repeat_last_observed"
//!
//! [forecast.search]
//! max_p = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use salescast_core::forecast::ForecastOptions;

/// Unique identifier for a batch configuration (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where the raw exports live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub train_csv: PathBuf,
    pub store_csv: PathBuf,
}

/// Where results go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Directory for the forecast table, exports and reports.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Checkpoint log; defaults to `<dir>/checkpoints.jsonl`.
    #[serde(default)]
    pub checkpoint_log: Option<PathBuf>,

    /// Write `store_{id}_forecast.csv` and `store_{id}_evaluation.csv`.
    #[serde(default = "default_true")]
    pub export_per_store: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            checkpoint_log: None,
            export_per_store: true,
        }
    }
}

impl OutputConfig {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_log
            .clone()
            .unwrap_or_else(|| self.dir.join("checkpoints.jsonl"))
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join("batch_report.json")
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.dir.join("inventory.csv")
    }
}

/// Complete configuration for one batch invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    pub source: SourceConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub forecast: ForecastOptions,

    /// Stores with fewer daily observations fail as insufficient data.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

fn default_min_observations() -> usize {
    60
}

impl BatchConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.forecast;
        if !(f.train_fraction > 0.0 && f.train_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "forecast.train_fraction must be in (0, 1), got {}",
                f.train_fraction
            )));
        }
        if f.horizon == 0 {
            return Err(ConfigError::Invalid("forecast.horizon must be at least 1".into()));
        }
        if f.search.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "forecast.search.max_steps must be at least 1".into(),
            ));
        }
        if self.min_observations < 2 {
            return Err(ConfigError::Invalid(format!(
                "min_observations must be at least 2, got {}",
                self.min_observations
            )));
        }
        Ok(())
    }

    /// Deterministic hash of the configuration.
    ///
    /// Two invocations with identical configs share a RunId, which stamps the
    /// batch report.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        let hash = blake3::hash(json.as_bytes());
        Ok(hash.to_hex().to_string())
    }
}
