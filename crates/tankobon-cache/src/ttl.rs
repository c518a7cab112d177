//! Time-based cache with expiry notification.
//!
//! Entries carry their own deadline. An expired entry is never returned: it
//! is evicted when a read finds it, or when a sweep runs, and in both cases
//! the expiry listener (if any) receives the evicted key and value. Explicit
//! [`TtlCache::remove`] never notifies the listener.
//!
//! The listener always runs outside the internal lock, so it may call back
//! into the cache.

use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::trace;

/// Callback receiving entries whose TTL elapsed
pub type ExpiryListener<K, V> = Box<dyn Fn(K, V) + Send + Sync>;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Map of values that expire a fixed time after insertion
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
    on_expire: Option<ExpiryListener<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            on_expire: None,
        }
    }

    /// Create a cache that reports expired entries to `listener`
    pub fn with_listener(ttl: Duration, listener: impl Fn(K, V) + Send + Sync + 'static) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            on_expire: Some(Box::new(listener)),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert with the default TTL, returning the previous live value
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.insert_with_ttl(key, value, self.ttl)
    }

    /// Insert with an explicit TTL, returning the previous live value
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        let now = Instant::now();
        let previous = self.entries.lock().insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        previous.filter(|e| !e.is_expired(now)).map(|e| e.value)
    }

    /// Get a live value. An expired entry is evicted and reported instead.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let expired = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => entries.remove_entry(key),
            }
        };
        if let Some((k, entry)) = expired {
            self.notify(k, entry.value);
        }
        None
    }

    /// Value stored for the key, even if expired, without evicting it
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().get(key).map(|e| e.value.clone())
    }

    /// Whether a live entry exists for the key
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Restart the TTL of a live entry. Returns false if there is none.
    pub fn touch<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        match self.entries.lock().get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = now + self.ttl;
                true
            }
            _ => false,
        }
    }

    /// Update the value in place, or insert `init` with a fresh TTL.
    ///
    /// An existing entry keeps its deadline, even if it has already passed
    /// and not yet been swept: the update is then delivered with the next
    /// sweep instead of being lost.
    pub fn upsert(&self, key: K, init: V, update: impl FnOnce(&mut V)) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(&key) {
            Some(entry) => update(&mut entry.value),
            None => {
                entries.insert(
                    key,
                    Entry {
                        value: init,
                        expires_at: now + self.ttl,
                    },
                );
            }
        }
    }

    /// Remove an entry without notifying the listener
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().remove(key).map(|e| e.value)
    }

    /// Remove and return every expired entry without notifying the listener
    pub fn take_expired(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let keys: Vec<K> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.into_iter()
            .filter_map(|k| entries.remove_entry(&k))
            .map(|(k, e)| (k, e.value))
            .collect()
    }

    /// Evict every expired entry, notifying the listener. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        let expired = self.take_expired();
        let count = expired.len();
        for (key, value) in expired {
            self.notify(key, value);
        }
        if count > 0 {
            trace!("Evicted {} expired cache entries", count);
        }
        count
    }

    /// Remove every entry, expired or not, without notifying the listener
    pub fn drain(&self) -> Vec<(K, V)> {
        self.entries
            .lock()
            .drain()
            .map(|(k, e)| (k, e.value))
            .collect()
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn notify(&self, key: K, value: V) {
        if let Some(listener) = &self.on_expire {
            listener(key, value);
        }
    }
}

/// Periodically evict expired entries until the cache is dropped
pub fn spawn_sweeper<K, V>(cache: &Arc<TtlCache<K, V>>, interval: Duration) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    let cache: Weak<TtlCache<K, V>> = Arc::downgrade(cache);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(strong) = cache.upgrade() else {
                break;
            };
            strong.evict_expired();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SHORT: Duration = Duration::from_millis(30);

    #[test]
    fn test_insert_and_get() {
        let cache = TtlCache::new(Duration::from_secs(60));
        assert!(cache.insert("a".to_string(), 1).is_none());
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.insert("a".to_string(), 2), Some(1));
        assert_eq!(cache.get("a"), Some(2));
        assert!(cache.get("b").is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_never_returned() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let cache = TtlCache::with_listener(SHORT, move |_k: String, _v: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cache.insert("a".to_string(), 1);

        tokio::time::sleep(SHORT * 2).await;
        assert!(!cache.contains_key("a"));
        assert!(cache.get("a").is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_remove_does_not_notify() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let cache = TtlCache::with_listener(SHORT, move |_k: String, _v: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.remove("a"), Some(1));

        tokio::time::sleep(SHORT * 2).await;
        assert_eq!(cache.evict_expired(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_touch_extends_lifetime() {
        let cache = TtlCache::new(Duration::from_millis(80));
        cache.insert("a", 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.touch("a"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("a"), Some(1));
        assert!(!cache.touch("missing"));
    }

    #[tokio::test]
    async fn test_upsert_keeps_deadline() {
        let cache = TtlCache::new(SHORT);
        cache.upsert("c1", 1u64, |n| *n += 1);
        cache.upsert("c1", 1u64, |n| *n += 1);
        assert_eq!(cache.get("c1"), Some(2));

        tokio::time::sleep(SHORT * 2).await;
        // Late update lands on the expired entry and is handed out by the sweep
        cache.upsert("c1", 1u64, |n| *n += 1);
        assert_eq!(cache.take_expired(), vec![("c1", 3)]);
    }

    #[tokio::test]
    async fn test_sweeper_fires_listener() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let cache = Arc::new(TtlCache::with_listener(SHORT, move |_k: u32, _v: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        cache.insert(1, 10);
        cache.insert(2, 20);

        let sweeper = spawn_sweeper(&cache, Duration::from_millis(10));
        tokio::time::sleep(SHORT * 4).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_drain() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, "a");
        cache.insert(2, "b");
        let mut drained = cache.drain();
        drained.sort_unstable();
        assert_eq!(drained, vec![(1, "a"), (2, "b")]);
        assert_eq!(cache.len(), 0);
    }
}
