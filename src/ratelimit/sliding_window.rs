//! Sliding-window log.
//!
//! Each identifier keeps the timestamps of its admitted requests, oldest
//! first. Entries older than `now - window` are pruned lazily on every access,
//! so the log never holds more than `max_requests` entries and no trailing
//! window ever admits more than `max_requests`.

use std::collections::VecDeque;
use std::time::Duration;

use super::algorithm::Algorithm;
use super::decision::Decision;
use super::rules::AlgorithmKind;

/// Admission timestamps, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingWindowState {
    log: VecDeque<Duration>,
}

impl SlidingWindowState {
    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SlidingWindowLog {
    max_requests: u64,
    window: Duration,
}

impl SlidingWindowLog {
    pub(crate) fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    fn prune(&self, state: &mut SlidingWindowState, now: Duration) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while state.log.front().is_some_and(|&ts| ts < cutoff) {
            state.log.pop_front();
        }
    }

    /// When the oldest entry leaves the window.
    fn reset_at(&self, state: &SlidingWindowState, now: Duration) -> Duration {
        state.log.front().copied().unwrap_or(now) + self.window
    }
}

impl Algorithm for SlidingWindowLog {
    type State = SlidingWindowState;

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::SlidingWindow
    }

    fn limit(&self) -> u64 {
        self.max_requests
    }

    fn new_state(&self, _now: Duration) -> SlidingWindowState {
        SlidingWindowState::default()
    }

    fn admit(&self, state: &mut SlidingWindowState, now: Duration, cost: u64) -> Decision {
        self.prune(state, now);
        let used = state.log.len() as u64;

        if used.saturating_add(cost) <= self.max_requests {
            // Keep the log sorted even if the clock steps backwards.
            let stamp = state.log.back().map_or(now, |&last| last.max(now));
            for _ in 0..cost {
                state.log.push_back(stamp);
            }
            return Decision::allow(
                self.max_requests,
                self.max_requests - state.log.len() as u64,
                Some(self.reset_at(state, now)),
            );
        }

        // `cost` fits once the oldest `used + cost - max` entries expire.
        let retry_after = if cost <= self.max_requests {
            let must_expire = (used + cost - self.max_requests) as usize;
            state
                .log
                .get(must_expire - 1)
                .map(|&ts| (ts + self.window).saturating_sub(now))
        } else {
            None
        };
        Decision::deny(
            self.max_requests,
            self.max_requests.saturating_sub(used),
            Some(self.reset_at(state, now)),
            retry_after,
        )
    }

    fn remaining(&self, state: &mut SlidingWindowState, now: Duration) -> u64 {
        self.prune(state, now);
        self.max_requests.saturating_sub(state.log.len() as u64)
    }

    fn reclaim_after(&self) -> Duration {
        self.window
    }
}
