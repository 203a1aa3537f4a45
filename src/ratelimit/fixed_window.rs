//! Fixed-window counting.
//!
//! Time is cut into epoch-aligned buckets of `window` length and each bucket
//! admits at most `max_requests`. A client that spends its quota at the end of
//! one bucket and again at the start of the next gets up to twice the quota
//! inside a single window span; that boundary burst is the accepted cost of
//! keeping only one counter per identifier.

use std::time::Duration;

use super::algorithm::Algorithm;
use super::decision::Decision;
use super::rules::AlgorithmKind;

/// Counter for the bucket an identifier was last seen in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedWindowState {
    /// Index of the bucket (`now / window`)
    bucket: u64,
    /// Cost admitted in that bucket
    count: u64,
}

impl FixedWindowState {
    /// Cost admitted in the current bucket.
    pub fn count(&self) -> u64 {
        self.count
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FixedWindow {
    max_requests: u64,
    window: Duration,
}

impl FixedWindow {
    pub(crate) fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    fn bucket_of(&self, now: Duration) -> u64 {
        let bucket = now.as_nanos() / self.window.as_nanos();
        u64::try_from(bucket).unwrap_or(u64::MAX)
    }

    /// Start of the bucket after `bucket`, saturating at `Duration::MAX`.
    fn bucket_end(&self, bucket: u64) -> Duration {
        u32::try_from(bucket.saturating_add(1))
            .ok()
            .and_then(|buckets| self.window.checked_mul(buckets))
            .unwrap_or_else(|| {
                let nanos = (u128::from(bucket) + 1).saturating_mul(self.window.as_nanos());
                from_nanos_saturating(nanos)
            })
    }

    /// Move the state forward into the bucket containing `now`, dropping the
    /// old count. A `now` from an earlier bucket is charged to the current one.
    fn roll(&self, state: &mut FixedWindowState, now: Duration) {
        let bucket = self.bucket_of(now);
        if bucket > state.bucket {
            state.bucket = bucket;
            state.count = 0;
        }
    }
}

fn from_nanos_saturating(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    match u64::try_from(nanos / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

impl Algorithm for FixedWindow {
    type State = FixedWindowState;

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::FixedWindow
    }

    fn limit(&self) -> u64 {
        self.max_requests
    }

    fn new_state(&self, now: Duration) -> FixedWindowState {
        FixedWindowState {
            bucket: self.bucket_of(now),
            count: 0,
        }
    }

    fn admit(&self, state: &mut FixedWindowState, now: Duration, cost: u64) -> Decision {
        self.roll(state, now);
        let reset_at = self.bucket_end(state.bucket);

        if state.count.saturating_add(cost) <= self.max_requests {
            state.count += cost;
            return Decision::allow(
                self.max_requests,
                self.max_requests - state.count,
                Some(reset_at),
            );
        }

        let retry_after = if cost <= self.max_requests {
            Some(reset_at.saturating_sub(now))
        } else {
            None
        };
        Decision::deny(
            self.max_requests,
            self.max_requests.saturating_sub(state.count),
            Some(reset_at),
            retry_after,
        )
    }

    fn remaining(&self, state: &mut FixedWindowState, now: Duration) -> u64 {
        self.roll(state, now);
        self.max_requests.saturating_sub(state.count)
    }

    fn reclaim_after(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_quota_then_new_bucket() {
        let fw = FixedWindow::new(3, secs(60));
        let mut state = fw.new_state(secs(0));

        for (t, expected) in [(0, 2), (1, 1), (2, 0)] {
            let decision = fw.admit(&mut state, secs(t), 1);
            assert!(decision.allowed, "request at t={} should be allowed", t);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.reset_at, Some(secs(60)));
        }

        let decision = fw.admit(&mut state, secs(3), 1);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, Some(secs(57)));

        let decision = fw.admit(&mut state, secs(61), 1);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, Some(secs(120)));
    }

    #[test]
    fn test_deny_does_not_consume() {
        let fw = FixedWindow::new(5, secs(10));
        let mut state = fw.new_state(secs(0));

        assert!(fw.admit(&mut state, secs(0), 4).allowed);
        let decision = fw.admit(&mut state, secs(1), 2);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(state.count(), 4);

        // The single remaining slot is still usable.
        assert!(fw.admit(&mut state, secs(2), 1).allowed);
    }

    #[test]
    fn test_boundary_burst_is_admitted() {
        let fw = FixedWindow::new(3, secs(60));
        let mut state = fw.new_state(secs(59));

        let mut allowed = 0;
        for _ in 0..3 {
            allowed += fw.admit(&mut state, secs(59), 1).allowed as u32;
        }
        for _ in 0..3 {
            allowed += fw.admit(&mut state, secs(60), 1).allowed as u32;
        }

        // Six admissions inside a two-second span of a 60s window.
        assert_eq!(allowed, 6);
    }

    #[test]
    fn test_late_request_from_previous_bucket_does_not_reopen_it() {
        let fw = FixedWindow::new(3, secs(60));
        let mut state = fw.new_state(secs(120));

        assert!(fw.admit(&mut state, secs(120), 3).allowed);

        // Read the clock before the boundary but took the lock after it.
        let late = fw.admit(&mut state, Duration::from_millis(119_999), 1);
        assert!(!late.allowed);
        assert_eq!(late.reset_at, Some(secs(180)));

        let mut allowed = 3;
        for _ in 0..3 {
            allowed += fw.admit(&mut state, secs(121), 1).allowed as u32;
        }
        assert_eq!(allowed, 3);
        assert_eq!(state.count(), 3);
    }

    #[test]
    fn test_clock_step_back_keeps_current_bucket() {
        let fw = FixedWindow::new(2, secs(10));
        let mut state = fw.new_state(secs(25));
        fw.admit(&mut state, secs(25), 1);

        let decision = fw.admit(&mut state, secs(5), 1);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, Some(secs(30)));
        assert_eq!(fw.remaining(&mut state, secs(5)), 0);
    }

    #[test]
    fn test_reset_at_saturates_for_huge_windows() {
        let window = Duration::from_secs(u64::MAX / 2);
        let fw = FixedWindow::new(1, window);
        // Third bucket, whose end lies past `Duration::MAX`.
        let now = Duration::from_secs(u64::MAX - 1);
        let mut state = fw.new_state(now);

        let decision = fw.admit(&mut state, now, 1);
        assert!(decision.allowed);
        assert_eq!(decision.reset_at, Some(Duration::MAX));
    }

    #[test]
    fn test_reset_at_past_u64_nanos() {
        // 1000 years, well past what fits in u64 nanoseconds.
        let window = Duration::from_secs(1000 * 365 * 24 * 3600);
        let fw = FixedWindow::new(1, window);
        let mut state = fw.new_state(secs(0));

        let decision = fw.admit(&mut state, secs(0), 1);
        assert_eq!(decision.reset_at, Some(window));
    }

    #[test]
    fn test_cost_larger_than_limit_never_fits() {
        let fw = FixedWindow::new(2, secs(1));
        let mut state = fw.new_state(secs(0));

        let decision = fw.admit(&mut state, secs(0), 3);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.retry_after, None);
    }

    #[test]
    fn test_sub_second_windows() {
        let fw = FixedWindow::new(1, Duration::from_millis(250));
        let mut state = fw.new_state(Duration::from_millis(1000));

        assert!(fw.admit(&mut state, Duration::from_millis(1100), 1).allowed);
        assert!(!fw.admit(&mut state, Duration::from_millis(1200), 1).allowed);
        let decision = fw.admit(&mut state, Duration::from_millis(1250), 1);
        assert!(decision.allowed);
        assert_eq!(decision.reset_at, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_remaining_rolls_bucket() {
        let fw = FixedWindow::new(2, secs(10));
        let mut state = fw.new_state(secs(0));
        fw.admit(&mut state, secs(0), 2);

        assert_eq!(fw.remaining(&mut state, secs(5)), 0);
        assert_eq!(fw.remaining(&mut state, secs(10)), 2);
    }
}
