//! Rate limiter trait shared by every algorithm-specific limiter.

use std::time::Duration;

use super::decision::Decision;
use super::rules::LimiterConfig;

/// Trait for rate limiter implementations.
///
/// Each configured algorithm is wrapped in one implementor, chosen once when
/// the limiter is built, so callers hold a single handle type regardless of
/// the algorithm behind it.
pub trait RateLimiterBackend: Send + Sync {
    /// Check and consume `cost` units of quota for `identifier`.
    fn allow(&self, identifier: &str, cost: u32) -> Decision;

    /// Quota left for `identifier` without consuming any.
    fn remaining(&self, identifier: &str) -> u64;

    /// Clear one identifier's state, or all state when `None`.
    fn reset(&self, identifier: Option<&str>);

    /// Evict state idle for longer than `idle`. Returns the number evicted.
    fn sweep(&self, idle: Duration) -> usize;

    /// Number of identifiers currently holding state.
    fn tracked(&self) -> usize;

    /// The configuration this limiter was built from.
    fn config(&self) -> &LimiterConfig;
}
