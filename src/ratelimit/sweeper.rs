//! Background eviction of idle identifier state.
//!
//! Runs on its own timer, independent of request traffic. A late or skipped
//! sweep only delays memory reclamation; it never changes a decision.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::registry::LimiterRegistry;

/// Timing for the eviction sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// How often to sweep
    pub interval: Duration,
    /// Minimum idle time before an identifier's state is evicted
    pub idle_threshold: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            idle_threshold: Duration::from_secs(300),
        }
    }
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Spawn a task that sweeps every limiter in `registry` on a fixed interval.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(registry: Arc<LimiterRegistry>, config: SweeperConfig) -> SweeperHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    // tokio::time::interval panics on a zero period.
    let period = config.interval.max(Duration::from_millis(1));

    info!(
        interval_ms = period.as_millis() as u64,
        idle_threshold_secs = config.idle_threshold.as_secs(),
        "Starting eviction sweeper"
    );

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing is idle yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Walks every shard; runs on the blocking pool.
                    let sweep_registry = registry.clone();
                    let idle = config.idle_threshold;
                    let sweep = tokio::task::spawn_blocking(move || sweep_registry.sweep_all(idle));
                    match sweep.await {
                        Ok(evicted) => debug!(
                            evicted = evicted,
                            tracked = registry.tracked(),
                            "Eviction sweep complete"
                        ),
                        Err(e) => warn!(error = %e, "Eviction sweep failed"),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Eviction sweeper stopped");
    });

    SweeperHandle { shutdown, task }
}
