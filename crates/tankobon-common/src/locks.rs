//! Per-key async mutual exclusion.
//!
//! Operations touching the same key run one at a time; operations on
//! different keys proceed concurrently. A key's lock entry is dropped as soon
//! as nobody holds or waits on it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Table of async locks indexed by key
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until the key is free and hold it until the guard is dropped
    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let slot = Arc::clone(self.slots.lock().entry(key.clone()).or_default());
        let guard = Arc::clone(&slot).lock_owned().await;
        KeyedGuard {
            locks: self,
            key,
            slot,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one key of a [`KeyedLocks`] table
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = self.locks.slots.lock();
        // Only the table and this guard reference the slot: no waiters left
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}
