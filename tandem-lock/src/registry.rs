//! Reentrant per-key mutual exclusion.
//!
//! One mutex guards a map from key to the holding thread; one condition
//! variable wakes every waiter whenever any key is released. Waiters
//! re-check their own key after each wake-up, so there is no ordering among
//! them.
//!
//! A panic while the map is locked never leaves it half-updated, so a
//! poisoned mutex is recovered rather than reported.

use crate::error::{LockError, LockResult};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Registry of keys currently held, and by which thread.
pub struct LockRegistry<K> {
    holders: Mutex<HashMap<K, ThreadId>>,
    released: Condvar,
}

impl<K> LockRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            holders: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Blocks until `key` is free or already held by the calling thread.
    ///
    /// A reentrant acquisition returns a guard whose release is a no-op; the
    /// key stays held until the outermost guard goes away.
    ///
    /// Fails with [`LockError::Interrupted`] only if hashing, comparing or
    /// cloning `key` panics. Nothing is acquired in that case and other
    /// callers are unaffected.
    pub fn acquire(&self, key: K) -> LockResult<LockGuard<'_, K>> {
        let me = thread::current().id();
        let mut holders = self.lock_map();
        let mut waited = false;

        loop {
            match Self::claim(&mut holders, &key, me)? {
                Claim::Fresh => {
                    if waited {
                        debug!(?key, "acquired lock after waiting");
                    }
                    return Ok(LockGuard::new(self, key, true));
                }
                Claim::Reentrant => return Ok(LockGuard::new(self, key, false)),
                Claim::Busy => {
                    if !waited {
                        debug!(?key, "lock held by another thread, waiting");
                        waited = true;
                    }
                    holders = self
                        .released
                        .wait(holders)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `timeout` and
    /// returns `Ok(None)`.
    pub fn acquire_timeout(
        &self,
        key: K,
        timeout: Duration,
    ) -> LockResult<Option<LockGuard<'_, K>>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.acquire(key).map(Some);
        };
        let me = thread::current().id();
        let mut holders = self.lock_map();

        loop {
            match Self::claim(&mut holders, &key, me)? {
                Claim::Fresh => return Ok(Some(LockGuard::new(self, key, true))),
                Claim::Reentrant => return Ok(Some(LockGuard::new(self, key, false))),
                Claim::Busy => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(?key, ?timeout, "timed out waiting for lock");
                        return Ok(None);
                    }
                    let (guard, _) = self
                        .released
                        .wait_timeout(holders, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    holders = guard;
                }
            }
        }
    }

    /// Runs `f` while holding `key`.
    pub fn with_lock<T>(&self, key: K, f: impl FnOnce() -> T) -> LockResult<T> {
        let _guard = self.acquire(key)?;
        Ok(f())
    }

    /// Whether any thread currently holds `key`.
    pub fn is_locked(&self, key: &K) -> bool {
        self.lock_map().contains_key(key)
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.lock_map().len()
    }

    /// Records `me` as holder of `key` if it is free.
    ///
    /// A panic from the key's own `Hash`, `Eq` or `Clone` is caught here so
    /// it cannot poison the map; the map is only touched by a single insert,
    /// which either happens completely or not at all.
    fn claim(holders: &mut HashMap<K, ThreadId>, key: &K, me: ThreadId) -> LockResult<Claim> {
        panic::catch_unwind(AssertUnwindSafe(|| match holders.get(key).copied() {
            None => {
                holders.insert(key.clone(), me);
                Claim::Fresh
            }
            Some(holder) if holder == me => Claim::Reentrant,
            Some(_) => Claim::Busy,
        }))
        .map_err(|_| LockError::Interrupted)
    }

    // Every mutation is a single insert or remove, so a poisoned map is
    // still consistent.
    fn lock_map(&self) -> MutexGuard<'_, HashMap<K, ThreadId>> {
        self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, key: &K) {
        let mut holders = self.lock_map();
        holders.remove(key);
        drop(holders);
        self.released.notify_all();
    }
}

enum Claim {
    Fresh,
    Reentrant,
    Busy,
}

impl<K> Default for LockRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for LockRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry").finish_non_exhaustive()
    }
}

/// Scoped hold on a key. Dropping it releases the key if this acquisition
/// created the entry.
///
/// `!Send`: a guard has to be released by the thread that acquired it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    registry: &'a LockRegistry<K>,
    key: K,
    releases: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, K> LockGuard<'a, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn new(registry: &'a LockRegistry<K>, key: K, releases: bool) -> Self {
        Self {
            registry,
            key,
            releases,
            _not_send: PhantomData,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// `false` for a reentrant acquisition.
    pub fn releases(&self) -> bool {
        self.releases
    }

    /// Releases explicitly. Same as dropping.
    pub fn release(self) {}
}

impl<K> Drop for LockGuard<'_, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn drop(&mut self) {
        if self.releases {
            self.registry.release(&self.key);
        }
    }
}

impl<K> fmt::Debug for LockGuard<'_, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("releases", &self.releases)
            .finish()
    }
}
