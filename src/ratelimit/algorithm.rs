//! The capability every admission algorithm provides.

use std::time::Duration;

use super::decision::Decision;
use super::rules::AlgorithmKind;

/// A pure admission algorithm over one identifier's state.
///
/// Implementations never touch shared state or the clock; the limiter hands
/// them the identifier's state under its lock together with `now`.
pub trait Algorithm: Send + Sync + 'static {
    /// Per-identifier state.
    type State: Send + 'static;

    /// Which variant this is.
    fn kind(&self) -> AlgorithmKind;

    /// The advertised limit.
    fn limit(&self) -> u64;

    /// State for an identifier seen for the first time at `now`.
    fn new_state(&self, now: Duration) -> Self::State;

    /// Decide whether `cost` units may be admitted at `now`, updating `state`.
    fn admit(&self, state: &mut Self::State, now: Duration, cost: u64) -> Decision;

    /// Quota left at `now` without admitting anything.
    fn remaining(&self, state: &mut Self::State, now: Duration) -> u64;

    /// How long a state must go untouched before it is indistinguishable
    /// from a fresh one.
    fn reclaim_after(&self) -> Duration;
}
