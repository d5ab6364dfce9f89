//! TTL-keyed in-memory store.
//!
//! Foundation for both the fixed-window rate limiter and the CSRF token
//! service. One `RwLock` guards the whole map: `try_consume`, `put`, `touch`,
//! `delete` and `sweep` take the write lock, `remaining`, `reset_in` and `get`
//! take the read lock. Critical sections are single map operations; no I/O
//! happens while the lock is held.
//!
//! The store never errors. A missing key means "no history".

mod clock;
mod sweeper;


pub use clock::{Clock, ManualClock, SystemClock};
pub use sweeper::{spawn_sweeper, SweepHandle};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// One stored value plus the instant it was stamped and how long it lives.
///
/// For counters `stamped_at` is the window start and `lifetime` the window.
/// For tokens `stamped_at` is the issue (or last refresh) time and
/// `lifetime` the TTL.
#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    stamped_at: Instant,
    lifetime: Duration,
}

impl<V> Slot<V> {
    fn new(value: V, stamped_at: Instant, lifetime: Duration) -> Self {
        Self {
            value,
            stamped_at,
            lifetime,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stamped_at) >= self.lifetime
    }

    fn remaining_life(&self, now: Instant) -> Duration {
        self.lifetime
            .saturating_sub(now.saturating_duration_since(self.stamped_at))
    }
}

/// Concurrent key → value map with timestamp-based staleness.
pub struct TtlStore<V> {
    entries: RwLock<HashMap<String, Slot<V>>>,
    clock: Arc<dyn Clock>,
    /// Sweep evicts a slot once it is older than `stale_multiple × lifetime`.
    stale_multiple: u32,
}

impl<V> TtlStore<V> {
    /// Create an empty store.
    ///
    /// # Arguments
    /// * `clock` - Time source used for every staleness decision
    /// * `stale_multiple` - Multiple of a slot's lifetime after which `sweep` evicts it
    pub fn new(clock: Arc<dyn Clock>, stale_multiple: u32) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            stale_multiple: stale_multiple.max(1),
        }
    }

    // Every mutation is a single map operation, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of slots currently held, stale or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove `key`. Returns true if a slot was present.
    pub fn delete(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    /// Evict every slot older than `stale_multiple × lifetime`.
    ///
    /// Returns the number of evicted slots.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let multiple = self.stale_multiple;
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, slot| {
            now.saturating_duration_since(slot.stamped_at) <= slot.lifetime * multiple
        });
        before - entries.len()
    }
}

impl<V: Clone> TtlStore<V> {
    /// Insert or replace `key` with a fresh lifetime of `ttl`.
    pub fn put(&self, key: &str, value: V, ttl: Duration) {
        let now = self.clock.now();
        self.write().insert(key.to_string(), Slot::new(value, now, ttl));
    }

    /// Value for `key`, or `None` if absent or past its lifetime.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.read()
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.value.clone())
    }

    /// Restamp an unexpired slot so it lives `ttl` from now.
    ///
    /// Returns false (and changes nothing) if the key is absent or expired.
    pub fn touch(&self, key: &str, ttl: Duration) -> bool {
        let now = self.clock.now();
        let mut entries = self.write();
        match entries.get_mut(key) {
            Some(slot) if !slot.is_expired(now) => {
                slot.stamped_at = now;
                slot.lifetime = ttl;
                true
            }
            _ => false,
        }
    }

    /// Remove every slot whose value matches `predicate`, expired or not.
    ///
    /// Returns the number removed.
    pub fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&V) -> bool,
    {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, slot| !predicate(&slot.value));
        before - entries.len()
    }
}

impl TtlStore<u64> {
    /// Count one occurrence of `key` against `limit` in a fixed window.
    ///
    /// - No slot, or the window has elapsed: start a new window with count 1, allowed.
    /// - Inside the window with `count < limit`: increment, allowed.
    /// - Inside the window at the cap: not allowed, count unchanged.
    ///
    /// A zero `limit` admits nothing.
    pub fn try_consume(&self, key: &str, limit: u64, window: Duration) -> bool {
        if limit == 0 {
            return false;
        }

        let now = self.clock.now();
        let mut entries = self.write();

        if let Some(slot) = entries.get_mut(key) {
            if !slot.is_expired(now) {
                if slot.value >= limit {
                    return false;
                }
                slot.value += 1;
                return true;
            }
            // Window elapsed: replace, never merge.
            *slot = Slot::new(1, now, window);
            return true;
        }

        entries.insert(key.to_string(), Slot::new(1, now, window));
        true
    }

    /// Capacity left for `key` in its active window.
    ///
    /// Returns `limit` when there is no slot or the window has elapsed.
    pub fn remaining(&self, key: &str, limit: u64) -> u64 {
        let now = self.clock.now();
        match self.read().get(key) {
            Some(slot) if !slot.is_expired(now) => limit.saturating_sub(slot.value),
            _ => limit,
        }
    }

    /// Time until the active window for `key` ends, if there is one.
    pub fn reset_in(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.read()
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.remaining_life(now))
    }
}
