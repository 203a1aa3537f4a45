//! Limiter configuration and tier rules.
//!
//! [`LimiterConfig`] is the immutable, validated description of one limiter.
//! [`RulesConfig`] is the YAML-facing form: a set of named tiers, each a
//! [`LimitRule`] expressed as "N requests per unit" the way gateway operators
//! usually write quotas.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TollgateError};

/// The closed set of admission algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Counts requests in non-overlapping buckets aligned to the epoch.
    #[default]
    #[serde(alias = "fixed")]
    FixedWindow,
    /// Keeps a timestamp log and evaluates a trailing window.
    #[serde(alias = "sliding")]
    SlidingWindow,
    /// Continuously refilled bucket allowing bursts up to its capacity.
    #[serde(alias = "token-bucket")]
    TokenBucket,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmKind::FixedWindow => "fixed_window",
            AlgorithmKind::SlidingWindow => "sliding_window",
            AlgorithmKind::TokenBucket => "token_bucket",
        };
        f.write_str(name)
    }
}

/// Configuration for a single limiter. Created at startup, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum LimiterConfig {
    /// At most `max_requests` per epoch-aligned `window`.
    FixedWindow {
        /// Maximum requests admitted per bucket
        max_requests: u64,
        /// Bucket length
        window: Duration,
    },
    /// At most `max_requests` in any trailing `window`.
    SlidingWindow {
        /// Maximum requests admitted in the trailing window
        max_requests: u64,
        /// Trailing window length
        window: Duration,
    },
    /// Bucket of `capacity` tokens refilled at `refill_rate` tokens per second.
    TokenBucket {
        /// Maximum tokens (burst size)
        capacity: f64,
        /// Tokens restored per second
        refill_rate: f64,
    },
}

impl LimiterConfig {
    /// Fixed-window limiter configuration.
    pub fn fixed_window(max_requests: u64, window: Duration) -> Self {
        LimiterConfig::FixedWindow {
            max_requests,
            window,
        }
    }

    /// Sliding-window-log limiter configuration.
    pub fn sliding_window(max_requests: u64, window: Duration) -> Self {
        LimiterConfig::SlidingWindow {
            max_requests,
            window,
        }
    }

    /// Token-bucket limiter configuration.
    pub fn token_bucket(capacity: f64, refill_rate: f64) -> Self {
        LimiterConfig::TokenBucket {
            capacity,
            refill_rate,
        }
    }

    /// Which algorithm this configuration selects.
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            LimiterConfig::FixedWindow { .. } => AlgorithmKind::FixedWindow,
            LimiterConfig::SlidingWindow { .. } => AlgorithmKind::SlidingWindow,
            LimiterConfig::TokenBucket { .. } => AlgorithmKind::TokenBucket,
        }
    }

    /// The advertised limit: `max_requests`, or the whole-token capacity.
    pub fn limit(&self) -> u64 {
        match self {
            LimiterConfig::FixedWindow { max_requests, .. }
            | LimiterConfig::SlidingWindow { max_requests, .. } => *max_requests,
            LimiterConfig::TokenBucket { capacity, .. } => capacity.floor() as u64,
        }
    }

    /// Reject non-positive capacities, windows and refill rates.
    pub fn validate(&self) -> Result<()> {
        match self {
            LimiterConfig::FixedWindow {
                max_requests,
                window,
            }
            | LimiterConfig::SlidingWindow {
                max_requests,
                window,
            } => {
                if *max_requests == 0 {
                    return Err(TollgateError::InvalidConfiguration(
                        "max_requests must be greater than zero".to_string(),
                    ));
                }
                if window.is_zero() {
                    return Err(TollgateError::InvalidConfiguration(
                        "window must be greater than zero".to_string(),
                    ));
                }
            }
            LimiterConfig::TokenBucket {
                capacity,
                refill_rate,
            } => {
                if !capacity.is_finite() || *capacity <= 0.0 {
                    return Err(TollgateError::InvalidConfiguration(format!(
                        "capacity must be a positive number, got {}",
                        capacity
                    )));
                }
                if !refill_rate.is_finite() || *refill_rate <= 0.0 {
                    return Err(TollgateError::InvalidConfiguration(format!(
                        "refill_rate must be a positive number, got {}",
                        refill_rate
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Time unit for a rule's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// A tier's quota as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitRule {
    /// Admission algorithm
    #[serde(default)]
    pub algorithm: AlgorithmKind,
    /// Number of requests allowed per unit of time
    pub requests_per_unit: u64,
    /// The time unit
    pub unit: TimeUnit,
    /// Window length in seconds, overriding `unit`
    #[serde(default)]
    pub window_secs: Option<u64>,
    /// Token-bucket capacity (defaults to `requests_per_unit`)
    #[serde(default)]
    pub capacity: Option<f64>,
    /// Token-bucket refill rate per second (defaults to `requests_per_unit` spread over the window)
    #[serde(default)]
    pub refill_rate: Option<f64>,
}

impl LimitRule {
    /// Fixed-window rule of `requests_per_unit` per `unit`.
    pub fn fixed(requests_per_unit: u64, unit: TimeUnit) -> Self {
        Self {
            algorithm: AlgorithmKind::FixedWindow,
            requests_per_unit,
            unit,
            window_secs: None,
            capacity: None,
            refill_rate: None,
        }
    }

    /// The evaluation window for this rule.
    pub fn window(&self) -> Duration {
        self.window_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.unit.duration())
    }

    /// Translate into a limiter configuration. Validation happens when the
    /// limiter is built.
    pub fn to_limiter_config(&self) -> LimiterConfig {
        match self.algorithm {
            AlgorithmKind::FixedWindow => {
                LimiterConfig::fixed_window(self.requests_per_unit, self.window())
            }
            AlgorithmKind::SlidingWindow => {
                LimiterConfig::sliding_window(self.requests_per_unit, self.window())
            }
            AlgorithmKind::TokenBucket => {
                let capacity = self.capacity.unwrap_or(self.requests_per_unit as f64);
                let refill_rate = self.refill_rate.unwrap_or_else(|| {
                    self.requests_per_unit as f64 / self.window().as_secs_f64()
                });
                LimiterConfig::token_bucket(capacity, refill_rate)
            }
        }
    }
}

/// A set of named tiers, each with its own quota.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Tier used when a caller asks for one that is not configured
    #[serde(default)]
    pub default_tier: Option<String>,
    /// Map of tier name to rule
    #[serde(default)]
    pub tiers: HashMap<String, LimitRule>,
}

impl RulesConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock gateway tiers: premium, basic and anonymous (the default).
    pub fn gateway_defaults() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert("premium".to_string(), LimitRule::fixed(1000, TimeUnit::Minute));
        tiers.insert("basic".to_string(), LimitRule::fixed(100, TimeUnit::Minute));
        tiers.insert("anonymous".to_string(), LimitRule::fixed(10, TimeUnit::Minute));
        Self {
            default_tier: Some("anonymous".to_string()),
            tiers,
        }
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse rate limit rules: {}", e)))
    }

    /// Get the rule for a specific tier.
    pub fn get_tier(&self, tier: &str) -> Option<&LimitRule> {
        self.tiers.get(tier)
    }
}
