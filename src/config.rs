//! Configuration management for the aggregation engine
//!
//! Configuration is read from TOML files, can be overridden through
//! `STATAGG_*` environment variables, and falls back to sensible defaults.
//!
//! ```toml
//! [collector]
//! default_representation = "adder"
//! adder_shards = 32
//! initial_capacity = 1024
//!
//! [monitoring]
//! metrics_enabled = false
//! ```

use crate::aggregation::{CompilerOptions, Representation};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Config {
    /// Collector tuning
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Collector configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Representation of aggregated fields that do not request one
    #[serde(default)]
    pub default_representation: Representation,

    /// Shards per adder cell (power of two)
    #[serde(default = "default_adder_shards")]
    pub adder_shards: usize,

    /// Initial bucket capacity of each collector
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
}

/// Monitoring configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Record Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_adder_shards() -> usize {
    16
}
fn default_initial_capacity() -> usize {
    64
}
fn default_true() -> bool {
    true
}

const MAX_ADDER_SHARDS: usize = 1024;

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            default_representation: Representation::default(),
            adder_shards: default_adder_shards(),
            initial_capacity: default_initial_capacity(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path, e))
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self, String> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Collector
        if let Ok(repr) = std::env::var("STATAGG_DEFAULT_REPRESENTATION") {
            if let Some(r) = Representation::parse(&repr) {
                self.collector.default_representation = r;
            }
        }
        if let Ok(shards) = std::env::var("STATAGG_ADDER_SHARDS") {
            if let Ok(s) = shards.parse() {
                self.collector.adder_shards = s;
            }
        }
        if let Ok(capacity) = std::env::var("STATAGG_INITIAL_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.collector.initial_capacity = c;
            }
        }

        // Monitoring
        if let Ok(enabled) = std::env::var("STATAGG_METRICS_ENABLED") {
            if let Ok(e) = enabled.parse() {
                self.monitoring.metrics_enabled = e;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let shards = self.collector.adder_shards;
        if shards == 0 || !shards.is_power_of_two() {
            return Err(format!("Adder shards must be a power of two, got {}", shards));
        }
        if shards > MAX_ADDER_SHARDS {
            return Err(format!(
                "Adder shards must be <= {}, got {}",
                MAX_ADDER_SHARDS, shards
            ));
        }
        Ok(())
    }

    /// Schema compiler options derived from this configuration
    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            default_representation: self.collector.default_representation,
            adder_shards: self.collector.adder_shards,
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &str) -> Result<(), String> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file {}: {}", path, e))
    }
}
