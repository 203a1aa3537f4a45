//! Per-identifier state storage.
//!
//! The map only guards membership: looking up or inserting an identifier takes
//! a DashMap shard lock for the duration of the lookup. Each identifier's state
//! then sits behind its own mutex, so requests for unrelated identifiers never
//! wait on each other and a read-modify-write on one identifier is atomic.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

/// A stored state plus the bookkeeping eviction needs.
#[derive(Debug)]
struct Slot<S> {
    state: S,
    /// Latest time the identifier was admitted or checked
    last_seen: Duration,
    /// Set once the slot has been unlinked from the map
    evicted: bool,
}

/// Concurrent map from identifier to state with idle eviction.
#[derive(Debug)]
pub struct StateStore<S> {
    entries: DashMap<String, Arc<Mutex<Slot<S>>>>,
}

impl<S> StateStore<S> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Run `f` with exclusive access to the state for `id`, creating the
    /// state with `init` on first use.
    ///
    /// The identifier's lock is held only while `f` runs.
    pub fn get_or_create<R, F>(
        &self,
        id: &str,
        now: Duration,
        init: F,
        f: impl FnOnce(&mut S) -> R,
    ) -> R
    where
        F: Fn() -> S,
    {
        loop {
            let slot = self.slot(id, now, &init);
            let mut guard = slot.lock();

            // A sweep or reset unlinked this slot between lookup and lock.
            if guard.evicted {
                continue;
            }

            guard.last_seen = guard.last_seen.max(now);
            return f(&mut guard.state);
        }
    }

    /// Run `f` against the state for `id` if it exists. Never creates state.
    pub fn with_existing<R>(&self, id: &str, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        let slot = self.entries.get(id).map(|entry| Arc::clone(entry.value()))?;
        let mut guard = slot.lock();
        if guard.evicted {
            return None;
        }
        Some(f(&mut guard.state))
    }

    fn slot<F>(&self, id: &str, now: Duration, init: &F) -> Arc<Mutex<Slot<S>>>
    where
        F: Fn() -> S,
    {
        if let Some(entry) = self.entries.get(id) {
            return Arc::clone(entry.value());
        }

        let entry = self.entries.entry(id.to_string()).or_insert_with(|| {
            debug!(identifier = %id, "Creating rate limit state");
            Arc::new(Mutex::new(Slot {
                state: init(),
                last_seen: now,
                evicted: false,
            }))
        });
        Arc::clone(entry.value())
    }

    /// Drop the state for `id`. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        match self.entries.remove(id) {
            Some((_, slot)) => {
                slot.lock().evicted = true;
                true
            }
            None => false,
        }
    }

    /// Drop every identifier's state.
    pub fn clear(&self) {
        self.entries.retain(|_, slot| {
            slot.lock().evicted = true;
            false
        });
    }

    /// Remove entries untouched for longer than `idle`. Returns the number removed.
    ///
    /// Entries whose lock is currently held are in use and are skipped rather
    /// than waited on.
    pub fn sweep(&self, now: Duration, idle: Duration) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, slot| match slot.try_lock() {
            Some(mut guard) if now.saturating_sub(guard.last_seen) > idle => {
                guard.evicted = true;
                evicted += 1;
                false
            }
            _ => true,
        });
        evicted
    }

    /// Whether `id` currently has state.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of identifiers with state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S> Default for StateStore<S> {
    fn default() -> Self {
        Self::new()
    }
}
