//! Admission decisions and the header values derived from them.

use std::time::Duration;

/// Outcome of a single admission check. Ephemeral, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The configured limit (max requests, or whole-token capacity)
    pub limit: u64,
    /// Quota left after this decision
    pub remaining: u64,
    /// When the quota next frees up, as an offset from the UNIX epoch.
    /// `None` for the token bucket, which has no single reset instant.
    pub reset_at: Option<Duration>,
    /// On denial, how long until the same request could succeed.
    /// `None` when allowed, or when the cost can never fit.
    pub retry_after: Option<Duration>,
}

impl Decision {
    pub(crate) fn allow(limit: u64, remaining: u64, reset_at: Option<Duration>) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at,
            retry_after: None,
        }
    }

    pub(crate) fn deny(
        limit: u64,
        remaining: u64,
        reset_at: Option<Duration>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self {
            allowed: false,
            limit,
            remaining,
            reset_at,
            retry_after,
        }
    }

    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Header values a transport layer can attach to its response.
    pub fn headers(&self) -> RateLimitHeaders {
        RateLimitHeaders {
            limit: self.limit,
            remaining: self.remaining,
            reset: self.reset_at.map(ceil_secs),
            retry_after: if self.allowed {
                None
            } else {
                self.retry_after.map(ceil_secs)
            },
            tier: None,
        }
    }
}

/// Values for `X-RateLimit-*` and `Retry-After`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// `X-RateLimit-Limit`
    pub limit: u64,
    /// `X-RateLimit-Remaining`
    pub remaining: u64,
    /// `X-RateLimit-Reset`, epoch seconds
    pub reset: Option<u64>,
    /// `Retry-After`, whole seconds
    pub retry_after: Option<u64>,
    /// `X-RateLimit-Tier`, set when the decision came through a registry tier
    pub tier: Option<String>,
}

impl RateLimitHeaders {
    pub const LIMIT: &'static str = "X-RateLimit-Limit";
    pub const REMAINING: &'static str = "X-RateLimit-Remaining";
    pub const RESET: &'static str = "X-RateLimit-Reset";
    pub const RETRY_AFTER: &'static str = "Retry-After";
    pub const TIER: &'static str = "X-RateLimit-Tier";

    /// Attach the tier that served the request.
    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Header name/value pairs, skipping the ones that do not apply.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (Self::LIMIT, self.limit.to_string()),
            (Self::REMAINING, self.remaining.to_string()),
        ];
        if let Some(reset) = self.reset {
            pairs.push((Self::RESET, reset.to_string()));
        }
        if let Some(retry_after) = self.retry_after {
            pairs.push((Self::RETRY_AFTER, retry_after.to_string()));
        }
        if let Some(tier) = &self.tier {
            pairs.push((Self::TIER, tier.clone()));
        }
        pairs
    }
}

fn ceil_secs(d: Duration) -> u64 {
    if d.subsec_nanos() > 0 {
        d.as_secs().saturating_add(1)
    } else {
        d.as_secs()
    }
}
