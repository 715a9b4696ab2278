//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.textagg.toml` files.

use crate::store::DEFAULT_CAPACITY;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".textagg.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Result cache and durable storage.
    #[serde(default)]
    pub store: StoreConfig,

    /// Query defaults.
    #[serde(default)]
    pub query: QueryConfig,

    /// Live-job handling.
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report output path; stdout when unset.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of concurrent consumers delivering partial results.
    #[serde(default = "default_consumers")]
    pub consumers: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            verbose: false,
            consumers: default_consumers(),
        }
    }
}

fn default_consumers() -> usize {
    4
}

/// Result store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Finalized results kept in memory before FIFO eviction.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Directory receiving one JSON record per finalized job.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            results_dir: default_results_dir(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Ranking size for snapshots of jobs still in flight.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

/// Aggregation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Drop live jobs idle for this many seconds. Unset keeps
    /// incomplete jobs forever.
    #[serde(default)]
    pub idle_expiry_seconds: Option<u64>,
}

impl AggregationConfig {
    pub fn idle_expiry(&self) -> Option<Duration> {
        self.idle_expiry_seconds.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = Some(output.clone());
        }
        if let Some(consumers) = args.consumers {
            self.general.consumers = consumers;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(capacity) = args.capacity {
            self.store.capacity = capacity;
        }
        if let Some(ref dir) = args.results_dir {
            self.store.results_dir = dir.clone();
        }

        if let Some(top_n) = args.top_n {
            self.query.top_n = top_n;
        }

        if let Some(secs) = args.expire_idle {
            self.aggregation.idle_expiry_seconds = Some(secs);
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.capacity == 0 {
            bail!("store.capacity must be at least 1");
        }
        if self.general.consumers == 0 {
            bail!("general.consumers must be at least 1");
        }
        if self.query.top_n == 0 {
            bail!("query.top_n must be at least 1");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
