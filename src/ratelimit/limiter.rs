//! Core rate limiter implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::algorithm::Algorithm;
use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::decision::Decision;
use super::fixed_window::FixedWindow;
use super::rules::LimiterConfig;
use super::sliding_window::SlidingWindowLog;
use super::store::StateStore;
use super::token_bucket::TokenBucket;
use crate::error::Result;

/// One algorithm paired with the per-identifier state it operates on.
struct Limiter<A: Algorithm> {
    algorithm: A,
    config: LimiterConfig,
    store: StateStore<A::State>,
    clock: Arc<dyn Clock>,
}

impl<A: Algorithm> Limiter<A> {
    fn new(algorithm: A, config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            algorithm,
            config,
            store: StateStore::new(),
            clock,
        }
    }
}

impl<A: Algorithm> RateLimiterBackend for Limiter<A> {
    fn allow(&self, identifier: &str, cost: u32) -> Decision {
        // A zero cost is treated as a single request.
        let cost = u64::from(cost.max(1));
        let now = self.clock.now();

        trace!(
            identifier = %identifier,
            cost = cost,
            "Checking rate limit"
        );

        let decision = self.store.get_or_create(
            identifier,
            now,
            || self.algorithm.new_state(now),
            |state| self.algorithm.admit(state, now, cost),
        );

        if !decision.allowed {
            debug!(
                identifier = %identifier,
                algorithm = %self.algorithm.kind(),
                limit = decision.limit,
                remaining = decision.remaining,
                "Rate limit exceeded"
            );
        }

        decision
    }

    fn remaining(&self, identifier: &str) -> u64 {
        let now = self.clock.now();
        self.store
            .with_existing(identifier, |state| self.algorithm.remaining(state, now))
            .unwrap_or_else(|| self.algorithm.limit())
    }

    fn reset(&self, identifier: Option<&str>) {
        match identifier {
            Some(identifier) => {
                self.store.remove(identifier);
            }
            None => self.store.clear(),
        }
    }

    fn sweep(&self, idle: Duration) -> usize {
        // Never evict state that could still influence a decision.
        let idle = idle.max(self.algorithm.reclaim_after());
        self.store.sweep(self.clock.now(), idle)
    }

    fn tracked(&self) -> usize {
        self.store.len()
    }

    fn config(&self) -> &LimiterConfig {
        &self.config
    }
}

/// Handle to a configured rate limiter.
///
/// Cheap to clone; clones share the same state. Safe to call from any number
/// of threads or tasks at once.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<dyn RateLimiterBackend>,
}

impl RateLimiter {
    /// Build a limiter that reads wall-clock time.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a limiter against a specific time source.
    ///
    /// Fails with `InvalidConfiguration` if any capacity, window or refill
    /// rate is not positive.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let inner: Arc<dyn RateLimiterBackend> = match &config {
            LimiterConfig::FixedWindow {
                max_requests,
                window,
            } => Arc::new(Limiter::new(
                FixedWindow::new(*max_requests, *window),
                config.clone(),
                clock,
            )),
            LimiterConfig::SlidingWindow {
                max_requests,
                window,
            } => Arc::new(Limiter::new(
                SlidingWindowLog::new(*max_requests, *window),
                config.clone(),
                clock,
            )),
            LimiterConfig::TokenBucket {
                capacity,
                refill_rate,
            } => Arc::new(Limiter::new(
                TokenBucket::new(*capacity, *refill_rate),
                config.clone(),
                clock,
            )),
        };

        info!(
            algorithm = %config.kind(),
            limit = config.limit(),
            "Rate limiter initialized"
        );

        Ok(Self { inner })
    }

    /// Wrap a custom backend.
    pub fn from_backend(backend: Arc<dyn RateLimiterBackend>) -> Self {
        Self { inner: backend }
    }

    /// Check and consume `cost` units of quota for `identifier`.
    ///
    /// State for an identifier is created on its first request.
    pub fn allow(&self, identifier: &str, cost: u32) -> Decision {
        self.inner.allow(identifier, cost)
    }

    /// Check and consume a single unit of quota.
    pub fn check(&self, identifier: &str) -> Decision {
        self.inner.allow(identifier, 1)
    }

    /// Quota left for `identifier`. Unknown identifiers report the full limit.
    pub fn remaining(&self, identifier: &str) -> u64 {
        self.inner.remaining(identifier)
    }

    /// Clear one identifier's state, or all state when `None`.
    ///
    /// This is primarily useful for administration and testing.
    pub fn reset(&self, identifier: Option<&str>) {
        self.inner.reset(identifier)
    }

    /// Evict state untouched for longer than `idle`, or longer than the
    /// algorithm's own reclaim span if that is greater.
    pub fn sweep(&self, idle: Duration) -> usize {
        self.inner.sweep(idle)
    }

    /// Get the number of identifiers currently holding state.
    pub fn tracked(&self) -> usize {
        self.inner.tracked()
    }

    /// The configuration this limiter was built from.
    pub fn config(&self) -> &LimiterConfig {
        self.inner.config()
    }

    /// The advertised limit.
    pub fn limit(&self) -> u64 {
        self.inner.config().limit()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", self.config())
            .field("tracked", &self.tracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TollgateError;
    use crate::ratelimit::clock::ManualClock;
    use proptest::prelude::*;
    use std::sync::Barrier;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn limiter_at(config: LimiterConfig, start: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_secs(start));
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(LimiterConfig::fixed_window(10, secs(1))).unwrap();
        assert_eq!(limiter.tracked(), 0);
        assert_eq!(limiter.limit(), 10);
    }

    #[test]
    fn test_invalid_configuration_fails_at_construction() {
        let result = RateLimiter::new(LimiterConfig::token_bucket(5.0, 0.0));
        assert!(matches!(
            result,
            Err(TollgateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_allow_creates_state() {
        let (limiter, _) = limiter_at(LimiterConfig::fixed_window(10, secs(60)), 0);

        assert!(limiter.check("user").allowed);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_fixed_window_scenario() {
        let (limiter, clock) = limiter_at(LimiterConfig::fixed_window(3, secs(60)), 0);

        for (t, remaining) in [(0, 2), (1, 1), (2, 0)] {
            clock.set_secs(t);
            let decision = limiter.check("user");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, remaining);
        }

        clock.set_secs(3);
        let decision = limiter.check("user");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);

        clock.set_secs(61);
        let decision = limiter.check("user");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn test_token_bucket_scenario() {
        let (limiter, clock) = limiter_at(LimiterConfig::token_bucket(5.0, 1.0), 0);

        for _ in 0..5 {
            assert!(limiter.check("user").allowed);
        }
        assert!(!limiter.check("user").allowed);

        clock.set_secs(5);
        let decision = limiter.check("user");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_at, None);
    }

    #[test]
    fn test_sliding_window_scenario() {
        let (limiter, clock) = limiter_at(LimiterConfig::sliding_window(2, secs(10)), 0);

        assert!(limiter.check("user").allowed);
        clock.set_secs(5);
        assert!(limiter.check("user").allowed);
        clock.set_secs(8);
        assert!(!limiter.check("user").allowed);
        clock.set_secs(11);
        assert!(limiter.check("user").allowed);
    }

    #[test]
    fn test_remaining_strictly_decreases_by_cost() {
        for config in [
            LimiterConfig::fixed_window(20, secs(60)),
            LimiterConfig::sliding_window(20, secs(60)),
            LimiterConfig::token_bucket(20.0, 1.0),
        ] {
            let (limiter, _) = limiter_at(config, 100);
            let mut previous = limiter.remaining("user");
            for cost in [1, 3, 2, 5] {
                let decision = limiter.allow("user", cost);
                assert!(decision.allowed);
                assert_eq!(decision.remaining, previous - u64::from(cost));
                previous = decision.remaining;
            }
        }
    }

    #[test]
    fn test_zero_cost_counts_as_one() {
        let (limiter, _) = limiter_at(LimiterConfig::fixed_window(2, secs(60)), 0);
        assert_eq!(limiter.allow("user", 0).remaining, 1);
    }

    #[test]
    fn test_different_identifiers_are_independent() {
        let (limiter, _) = limiter_at(LimiterConfig::fixed_window(5, secs(60)), 0);

        limiter.allow("alice", 5);
        assert!(!limiter.check("alice").allowed);
        assert!(limiter.check("bob").allowed);
        assert_eq!(limiter.remaining("bob"), 4);
    }

    #[test]
    fn test_remaining_for_unknown_identifier_does_not_create_state() {
        let (limiter, _) = limiter_at(LimiterConfig::sliding_window(7, secs(60)), 0);
        assert_eq!(limiter.remaining("nobody"), 7);
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_reset_behaves_like_fresh_identifier() {
        for config in [
            LimiterConfig::fixed_window(3, secs(60)),
            LimiterConfig::sliding_window(3, secs(60)),
            LimiterConfig::token_bucket(3.0, 0.1),
        ] {
            let (limiter, _) = limiter_at(config, 30);
            let fresh = limiter.check("fresh");

            limiter.allow("user", 3);
            assert!(!limiter.check("user").allowed);

            limiter.reset(Some("user"));
            assert_eq!(limiter.check("user"), fresh);
        }
    }

    #[test]
    fn test_reset_all() {
        let (limiter, _) = limiter_at(LimiterConfig::fixed_window(1, secs(60)), 0);
        limiter.check("a");
        limiter.check("b");
        assert_eq!(limiter.tracked(), 2);

        limiter.reset(None);
        assert_eq!(limiter.tracked(), 0);
        assert!(limiter.check("a").allowed);
    }

    #[test]
    fn test_sweep_never_evicts_state_still_in_window() {
        let (limiter, clock) = limiter_at(LimiterConfig::sliding_window(1, secs(60)), 0);
        assert!(limiter.check("user").allowed);

        // An aggressive threshold is raised to the window length.
        clock.set_secs(30);
        assert_eq!(limiter.sweep(secs(1)), 0);
        assert!(!limiter.check("user").allowed);

        clock.set_secs(91);
        assert_eq!(limiter.sweep(secs(1)), 1);
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_sweep_token_bucket_waits_for_full_refill() {
        let (limiter, clock) = limiter_at(LimiterConfig::token_bucket(10.0, 2.0), 0);
        limiter.allow("user", 10);

        clock.set_secs(4);
        assert_eq!(limiter.sweep(Duration::ZERO), 0);

        clock.set_secs(10);
        assert_eq!(limiter.sweep(Duration::ZERO), 1);
        assert_eq!(limiter.remaining("user"), 10);
    }

    #[test]
    fn test_sweep_respects_longer_idle_threshold() {
        let (limiter, clock) = limiter_at(LimiterConfig::fixed_window(1, secs(1)), 0);
        limiter.check("user");

        clock.set_secs(100);
        assert_eq!(limiter.sweep(secs(300)), 0);
        clock.set_secs(301);
        assert_eq!(limiter.sweep(secs(300)), 1);
    }

    #[test]
    fn test_concurrent_callers_respect_quota() {
        const CALLERS: usize = 32;

        for config in [
            LimiterConfig::fixed_window(CALLERS as u64 - 1, secs(60)),
            LimiterConfig::sliding_window(CALLERS as u64 - 1, secs(60)),
            LimiterConfig::token_bucket(CALLERS as f64 - 1.0, 0.001),
        ] {
            let (limiter, _) = limiter_at(config, 0);
            let barrier = Barrier::new(CALLERS);

            let allowed: usize = std::thread::scope(|s| {
                let handles: Vec<_> = (0..CALLERS)
                    .map(|_| {
                        s.spawn(|| {
                            barrier.wait();
                            limiter.check("shared").allowed as usize
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).sum()
            });

            assert_eq!(allowed, CALLERS - 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_respect_quota() {
        let (limiter, _) = limiter_at(LimiterConfig::fixed_window(99, secs(60)), 0);

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check("shared").allowed })
            })
            .collect();

        let mut allowed = 0;
        for task in tasks {
            if task.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 99);
    }

    proptest! {
        #[test]
        fn prop_sliding_window_never_exceeds_quota(
            max_requests in 1u64..10,
            window_secs in 1u64..20,
            steps in prop::collection::vec((0u64..5_000, 1u32..4), 1..80),
        ) {
            let window = secs(window_secs);
            let (limiter, clock) =
                limiter_at(LimiterConfig::sliding_window(max_requests, window), 0);

            let mut now = Duration::ZERO;
            let mut admitted: Vec<(Duration, u64)> = Vec::new();
            for (advance_ms, cost) in steps {
                now += Duration::from_millis(advance_ms);
                clock.set(now);
                if limiter.allow("user", cost).allowed {
                    admitted.push((now, u64::from(cost)));
                    let in_window: u64 = admitted
                        .iter()
                        .filter(|(t, _)| *t + window >= now)
                        .map(|(_, c)| c)
                        .sum();
                    prop_assert!(in_window <= max_requests);
                }
            }
        }

        #[test]
        fn prop_fixed_window_never_exceeds_quota_per_bucket(
            max_requests in 1u64..10,
            window_secs in 1u64..20,
            steps in prop::collection::vec((0u64..5_000, 1u32..4), 1..80),
        ) {
            let window = secs(window_secs);
            let (limiter, clock) =
                limiter_at(LimiterConfig::fixed_window(max_requests, window), 0);

            let mut now = Duration::ZERO;
            let mut per_bucket = std::collections::HashMap::<u128, u64>::new();
            for (advance_ms, cost) in steps {
                now += Duration::from_millis(advance_ms);
                clock.set(now);
                if limiter.allow("user", cost).allowed {
                    let bucket = now.as_nanos() / window.as_nanos();
                    let used = per_bucket.entry(bucket).or_default();
                    *used += u64::from(cost);
                    prop_assert!(*used <= max_requests);
                }
            }
        }
    }
}
