//! Cache-aside read layer in front of the document store.
//!
//! Hits within the TTL are served without touching the store. Misses read
//! the store and cache the snapshot; absent documents are not cached.
//! Concurrent misses for the same id may each query the store.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tankobon_common::{Error, Result};
use tankobon_store::{Document, DocumentStore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::ttl::{TtlCache, spawn_sweeper};

/// Resolver statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: AtomicU64,
    /// Lookups that went to the store
    pub misses: AtomicU64,
    /// Entries purged by `remove` or `invalidate`
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// TTL-bounded resolver for one document type
pub struct Resolver<T: Document> {
    store: Arc<dyn DocumentStore<T>>,
    cache: Arc<TtlCache<String, Arc<T>>>,
    stats: CacheStats,
    /// Bumped on every purge. A miss only populates the cache if no purge
    /// happened while it was reading the store.
    epoch: Mutex<u64>,
}

impl<T: Document> Resolver<T> {
    pub fn new(store: Arc<dyn DocumentStore<T>>, ttl: Duration) -> Self {
        Self {
            store,
            cache: Arc::new(TtlCache::new(ttl)),
            stats: CacheStats::default(),
            epoch: Mutex::new(0),
        }
    }

    /// Find a document by id, failing with the type's not-found error
    pub async fn find_by_id(&self, id: &str) -> Result<Arc<T>> {
        if let Some(hit) = self.cache.get(id) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let epoch = *self.epoch.lock();
        let found = self.store.find_by_id(id).await.map_err(|e| {
            error!("Failed to load {} '{}': {}", T::COLLECTION.name(), id, e);
            Error::from(e)
        })?;
        let Some(doc) = found else {
            return Err(T::not_found(id));
        };

        let doc = Arc::new(doc);
        let current = self.epoch.lock();
        if *current == epoch {
            self.cache.insert(id.to_string(), Arc::clone(&doc));
        }
        Ok(doc)
    }

    /// Like [`Resolver::find_by_id`], mapping not-found to `None`
    pub async fn try_find_by_id(&self, id: &str) -> Result<Option<Arc<T>>> {
        match self.find_by_id(id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove a document from the store and purge its cache entry.
    ///
    /// The entry is purged even when the store call fails.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let result = self.store.remove(id).await;
        self.invalidate(id);
        match result {
            Ok(true) => {
                debug!("Removed {} '{}'", T::COLLECTION.name(), id);
                Ok(())
            }
            Ok(false) => Err(T::not_found(id)),
            Err(e) => {
                error!("Failed to remove {} '{}': {}", T::COLLECTION.name(), id, e);
                Err(e.into())
            }
        }
    }

    /// Drop the cached snapshot so the next read goes to the store
    pub fn invalidate(&self, id: &str) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        if self.cache.remove(id).is_some() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of cached snapshots, including expired ones not yet swept
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The underlying store, for writes that bypass the cache
    pub const fn store(&self) -> &Arc<dyn DocumentStore<T>> {
        &self.store
    }

    /// Periodically drop expired snapshots
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        spawn_sweeper(&self.cache, interval)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tankobon_common::{ContentId, ContentItem, Locale, Team, TeamId, UserId};
    use tankobon_store::{Filter, StoreError, StoreResult};

    /// In-memory store that counts reads
    pub struct CountingStore<T> {
        pub docs: Mutex<HashMap<String, T>>,
        pub reads: AtomicUsize,
        pub fail_removes: bool,
    }

    impl<T: Document> CountingStore<T> {
        pub fn new(docs: Vec<T>) -> Self {
            Self {
                docs: Mutex::new(docs.into_iter().map(|d| (d.key().to_string(), d)).collect()),
                reads: AtomicUsize::new(0),
                fail_removes: false,
            }
        }

        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<T: Document> DocumentStore<T> for CountingStore<T> {
        async fn find_by_id(&self, id: &str) -> StoreResult<Option<T>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.docs.lock().get(id).cloned())
        }

        async fn find_one(&self, filter: Filter<'_, T>) -> StoreResult<Option<T>> {
            Ok(self.docs.lock().values().find(|d| filter(*d)).cloned())
        }

        async fn find_all(&self, filter: Filter<'_, T>) -> StoreResult<Vec<T>> {
            Ok(self.docs.lock().values().filter(|d| filter(*d)).cloned().collect())
        }

        async fn insert(&self, doc: &T) -> StoreResult<()> {
            self.docs.lock().insert(doc.key().to_string(), doc.clone());
            Ok(())
        }

        async fn save(&self, doc: &T) -> StoreResult<()> {
            self.docs.lock().insert(doc.key().to_string(), doc.clone());
            Ok(())
        }

        async fn remove(&self, id: &str) -> StoreResult<bool> {
            let existed = self.docs.lock().remove(id).is_some();
            if self.fail_removes {
                return Err(StoreError::Unavailable("remove failed midway".to_string()));
            }
            Ok(existed)
        }
    }

    fn team(id: &str) -> Team {
        Team::new(TeamId::new(id), "Scanlators", UserId::new("owner"))
    }

    #[tokio::test]
    async fn test_repeated_find_within_ttl_hits_cache() {
        let store = Arc::new(CountingStore::new(vec![team("t1")]));
        let resolver: Resolver<Team> = Resolver::new(store.clone(), Duration::from_secs(60));

        let first = resolver.find_by_id("t1").await.unwrap();
        let second = resolver.find_by_id("t1").await.unwrap();

        assert_eq!(store.reads(), 1);
        assert_eq!(*first, *second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(resolver.stats().misses.load(Ordering::Relaxed), 1);
        assert!((resolver.stats().hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_find_after_ttl_goes_to_store() {
        let store = Arc::new(CountingStore::new(vec![team("t1")]));
        let resolver: Resolver<Team> = Resolver::new(store.clone(), Duration::from_millis(20));

        resolver.find_by_id("t1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        resolver.find_by_id("t1").await.unwrap();
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_missing_document_is_not_cached() {
        let store: Arc<CountingStore<Team>> = Arc::new(CountingStore::new(vec![]));
        let resolver: Resolver<Team> = Resolver::new(store.clone(), Duration::from_secs(60));

        let err = resolver.find_by_id("t9").await.unwrap_err();
        assert!(matches!(err, Error::TeamNotFound(ref id) if id == "t9"));
        assert!(resolver.try_find_by_id("t9").await.unwrap().is_none());
        assert_eq!(store.reads(), 2);
        assert_eq!(resolver.cached(), 0);
    }

    #[tokio::test]
    async fn test_find_after_remove_never_returns_entity() {
        let item = ContentItem::new(ContentId::new("c1"), Locale::En, "Name", "Desc");
        let store = Arc::new(CountingStore::new(vec![item]));
        let resolver: Resolver<ContentItem> = Resolver::new(store.clone(), Duration::from_secs(60));

        resolver.find_by_id("c1").await.unwrap();
        resolver.remove("c1").await.unwrap();

        let err = resolver.find_by_id("c1").await.unwrap_err();
        assert!(matches!(err, Error::ContentNotFound(_)));
        assert_eq!(resolver.stats().evictions.load(Ordering::Relaxed), 1);

        let err = resolver.remove("c1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_failed_remove_still_purges() {
        let mut store = CountingStore::new(vec![team("t1")]);
        store.fail_removes = true;
        let store = Arc::new(store);
        let resolver: Resolver<Team> = Resolver::new(store.clone(), Duration::from_secs(60));

        resolver.find_by_id("t1").await.unwrap();
        let err = resolver.remove("t1").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(resolver.cached(), 0);
        assert!(resolver.find_by_id("t1").await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let store = Arc::new(CountingStore::new(vec![team("t1")]));
        let resolver: Resolver<Team> = Resolver::new(store.clone(), Duration::from_secs(60));

        resolver.find_by_id("t1").await.unwrap();
        let mut renamed = team("t1");
        renamed.name = "Renamed".to_string();
        store.save(&renamed).await.unwrap();

        // Stale until invalidated
        assert_eq!(resolver.find_by_id("t1").await.unwrap().name, "Scanlators");
        resolver.invalidate("t1");
        assert_eq!(resolver.find_by_id("t1").await.unwrap().name, "Renamed");
    }
}
