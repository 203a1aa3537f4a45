//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{RulesConfig, SweeperConfig};

/// Prefix for environment overrides, e.g. `TOLLGATE__EVICTION__IDLE_THRESHOLD_SECS`.
const ENV_PREFIX: &str = "TOLLGATE";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for a Tollgate deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Idle-state eviction
    #[serde(default)]
    pub eviction: EvictionConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limit tiers
    #[serde(default = "RulesConfig::gateway_defaults")]
    pub limits: RulesConfig,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            eviction: EvictionConfig::default(),
            logging: LoggingConfig::default(),
            limits: RulesConfig::gateway_defaults(),
        }
    }
}

/// Eviction sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds an identifier must be idle before its state is evicted
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            idle_threshold_secs: default_idle_threshold(),
        }
    }
}

impl EvictionConfig {
    /// Timing for the background sweeper.
    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            idle_threshold: Duration::from_secs(self.idle_threshold_secs),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_threshold() -> u64 {
    300
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TollgateError::Config(e.to_string()))
    }

    /// Layer defaults, an optional YAML file and `TOLLGATE__*` environment
    /// variables, later sources winning.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: TollgateConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
