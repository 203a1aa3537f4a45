//! Token bucket with continuous refill.
//!
//! A bucket holds up to `capacity` tokens and gains `refill_rate` tokens per
//! second. Refill is applied before every check and the refill timestamp moves
//! forward even when the request is denied, so a rejected request never delays
//! later refills.

use std::time::Duration;

use super::algorithm::Algorithm;
use super::decision::Decision;
use super::rules::AlgorithmKind;

/// Token level as of `last_refill`.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketState {
    tokens: f64,
    last_refill: Duration,
}

impl TokenBucketState {
    /// Tokens held at the last refill.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// When tokens were last refilled.
    pub fn last_refill(&self) -> Duration {
        self.last_refill
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucket {
    pub(crate) fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
        }
    }

    fn level_at(&self, state: &TokenBucketState, now: Duration) -> f64 {
        let elapsed = now.saturating_sub(state.last_refill).as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    fn refill(&self, state: &mut TokenBucketState, now: Duration) {
        state.tokens = self.level_at(state, now);
        // Never move backwards, or the same span would be refilled twice.
        state.last_refill = state.last_refill.max(now);
    }
}

impl Algorithm for TokenBucket {
    type State = TokenBucketState;

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::TokenBucket
    }

    fn limit(&self) -> u64 {
        self.capacity.floor() as u64
    }

    fn new_state(&self, now: Duration) -> TokenBucketState {
        TokenBucketState {
            tokens: self.capacity,
            last_refill: now,
        }
    }

    fn admit(&self, state: &mut TokenBucketState, now: Duration, cost: u64) -> Decision {
        self.refill(state, now);
        let cost = cost as f64;

        if state.tokens >= cost {
            state.tokens -= cost;
            return Decision::allow(self.limit(), state.tokens.floor() as u64, None);
        }

        let retry_after = if cost <= self.capacity {
            Duration::try_from_secs_f64((cost - state.tokens) / self.refill_rate).ok()
        } else {
            None
        };
        Decision::deny(
            self.limit(),
            state.tokens.floor() as u64,
            None,
            retry_after,
        )
    }

    fn remaining(&self, state: &mut TokenBucketState, now: Duration) -> u64 {
        self.level_at(state, now).floor() as u64
    }

    fn reclaim_after(&self) -> Duration {
        Duration::try_from_secs_f64(self.capacity / self.refill_rate).unwrap_or(Duration::MAX)
    }
}
