//! Time sources for the rate limiting engine.
//!
//! Every timestamp the engine stores or reports is a [`Duration`] measured
//! from the UNIX epoch, so fixed-window buckets line up with wall-clock
//! boundaries and `reset_at` can be handed straight to a response header.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time as an offset from the UNIX epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        // A clock set before 1970 collapses to the epoch rather than panicking.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// A clock that only moves when told to.
///
/// Used by tests and by the simulation CLI to replay request timelines.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Duration) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at `secs` seconds after the epoch.
    pub fn at_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }

    /// Jump to `secs` seconds after the epoch.
    pub fn set_secs(&self, secs: u64) {
        self.set(Duration::from_secs(secs));
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}
