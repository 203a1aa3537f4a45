//! Tier name to limiter lookup.
//!
//! The registry is built once at startup. Callers map a principal to a tier
//! name, resolve the tier here once per request, and call `allow` on the
//! returned handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::decision::{Decision, RateLimitHeaders};
use super::limiter::RateLimiter;
use super::rules::RulesConfig;
use crate::error::{Result, TollgateError};

/// Named limiters with an optional fallback tier.
#[derive(Debug, Clone, Default)]
pub struct LimiterRegistry {
    limiters: HashMap<String, RateLimiter>,
    default_tier: Option<String>,
}

impl LimiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one limiter per configured tier, reading wall-clock time.
    pub fn from_rules(rules: &RulesConfig) -> Result<Self> {
        Self::from_rules_with_clock(rules, Arc::new(SystemClock))
    }

    /// Build one limiter per configured tier against a shared time source.
    pub fn from_rules_with_clock(rules: &RulesConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut registry = Self::new();

        for (tier, rule) in &rules.tiers {
            let limiter = RateLimiter::with_clock(rule.to_limiter_config(), clock.clone())
                .map_err(|e| match e {
                    TollgateError::InvalidConfiguration(msg) => {
                        TollgateError::InvalidConfiguration(format!("tier '{}': {}", tier, msg))
                    }
                    other => other,
                })?;
            registry.insert(tier.clone(), limiter);
        }

        if let Some(default_tier) = &rules.default_tier {
            registry.set_default_tier(default_tier)?;
        }

        info!(
            tiers = registry.len(),
            default_tier = ?registry.default_tier,
            "Rate limit tiers loaded"
        );

        Ok(registry)
    }

    /// Register or replace the limiter for `tier`.
    pub fn insert(&mut self, tier: impl Into<String>, limiter: RateLimiter) {
        self.limiters.insert(tier.into(), limiter);
    }

    /// Use `tier` for callers whose own tier is not registered.
    pub fn set_default_tier(&mut self, tier: &str) -> Result<()> {
        if !self.limiters.contains_key(tier) {
            return Err(TollgateError::Config(format!(
                "default tier '{}' is not defined",
                tier
            )));
        }
        self.default_tier = Some(tier.to_string());
        Ok(())
    }

    /// The fallback tier, if any.
    pub fn default_tier(&self) -> Option<&str> {
        self.default_tier.as_deref()
    }

    /// Get the limiter registered for exactly `tier`.
    pub fn get(&self, tier: &str) -> Option<&RateLimiter> {
        self.limiters.get(tier)
    }

    /// Get the limiter for `tier`, falling back to the default tier.
    pub fn resolve(&self, tier: &str) -> Result<&RateLimiter> {
        self.resolve_named(tier).map(|(_, limiter)| limiter)
    }

    /// Like `resolve`, also returning the name of the tier that matched.
    pub fn resolve_named(&self, tier: &str) -> Result<(&str, &RateLimiter)> {
        if let Some((name, limiter)) = self.limiters.get_key_value(tier) {
            return Ok((name.as_str(), limiter));
        }

        self.default_tier
            .as_deref()
            .and_then(|fallback| {
                debug!(tier = %tier, fallback = %fallback, "Unknown tier, using default");
                self.limiters.get_key_value(fallback)
            })
            .map(|(name, limiter)| (name.as_str(), limiter))
            .ok_or_else(|| TollgateError::UnknownTier(tier.to_string()))
    }

    /// Admit `cost` for `identifier` under `tier`, returning the decision and
    /// its headers tagged with the tier that served it.
    pub fn allow(
        &self,
        tier: &str,
        identifier: &str,
        cost: u32,
    ) -> Result<(Decision, RateLimitHeaders)> {
        let (served_by, limiter) = self.resolve_named(tier)?;
        let decision = limiter.allow(identifier, cost);
        let headers = decision.headers().with_tier(served_by);
        Ok((decision, headers))
    }

    /// Names of all registered tiers.
    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.limiters.keys().map(String::as_str)
    }

    /// Number of registered tiers.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no tiers are registered.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Sweep every limiter. Returns the total number of evicted identifiers.
    pub fn sweep_all(&self, idle: Duration) -> usize {
        self.limiters
            .iter()
            .map(|(tier, limiter)| {
                let evicted = limiter.sweep(idle);
                if evicted > 0 {
                    debug!(tier = %tier, evicted = evicted, "Evicted idle rate limit state");
                }
                evicted
            })
            .sum()
    }

    /// Clear the state of every limiter.
    pub fn reset_all(&self) {
        for limiter in self.limiters.values() {
            limiter.reset(None);
        }
    }

    /// Number of identifiers tracked across all tiers.
    pub fn tracked(&self) -> usize {
        self.limiters.values().map(RateLimiter::tracked).sum()
    }
}
