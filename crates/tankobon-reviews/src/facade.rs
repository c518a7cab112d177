//! Review store facade.
//!
//! Routes review operations to the per-content [`ReviewDatastore`], opening
//! it on first use. Every access refreshes an idle deadline; handles idle
//! past the deadline are closed by [`ReviewStore::evict_idle`] and reopened
//! transparently on the next access. At most one handle per content item is
//! ever open: all opens and closes for an id go through that id's slot lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tankobon_cache::TtlCache;
use tankobon_common::{ContentId, Error, Result, StorageLayout, UserId};
use tankobon_store::StoreResult;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::datastore::{ReviewDatastore, ReviewRecord};

type Slot = Arc<tokio::sync::Mutex<Option<ReviewDatastore>>>;

pub struct ReviewStore {
    layout: StorageLayout,
    slots: Mutex<HashMap<ContentId, Slot>>,
    idle: TtlCache<ContentId, ()>,
    open_handles: AtomicUsize,
}

impl ReviewStore {
    /// Handles are closed once unused for `idle_ttl`
    pub fn new(layout: StorageLayout, idle_ttl: Duration) -> Self {
        Self {
            layout,
            slots: Mutex::new(HashMap::new()),
            idle: TtlCache::new(idle_ttl),
            open_handles: AtomicUsize::new(0),
        }
    }

    pub async fn has_review(&self, content: &ContentId, user: &UserId) -> Result<bool> {
        self.with_store(content, |store| {
            Ok(store.find_by_reviewer(user)?.is_some())
        })
        .await
    }

    pub async fn find_review(
        &self,
        content: &ContentId,
        user: &UserId,
    ) -> Result<Option<ReviewRecord>> {
        self.with_store(content, |store| store.find_by_reviewer(user))
            .await
    }

    /// Store a review. Duplicates are not rejected here; callers check
    /// [`ReviewStore::has_review`] first.
    pub async fn insert_review(
        &self,
        content: &ContentId,
        record: ReviewRecord,
    ) -> Result<ReviewRecord> {
        self.with_store(content, |store| store.insert(record)).await
    }

    /// Delete the user's reviews. Returns false if there were none.
    pub async fn remove_review(&self, content: &ContentId, user: &UserId) -> Result<bool> {
        self.with_store(content, |store| Ok(store.remove_by_reviewer(user)? > 0))
            .await
    }

    /// Up to `limit` reviews, oldest first
    pub async fn list_reviews(&self, content: &ContentId, limit: usize) -> Result<Vec<ReviewRecord>> {
        self.with_store(content, |store| store.list(limit)).await
    }

    /// Number of review files currently open
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Close handles whose idle deadline passed. Returns how many were closed.
    pub async fn evict_idle(&self) -> usize {
        let mut closed = 0;
        for (content, ()) in self.idle.take_expired() {
            let Some(slot) = self.slots.lock().get(&content).cloned() else {
                continue;
            };
            let mut handle = slot.lock().await;
            if self.idle.contains_key(&content) {
                // Used again while we waited
                continue;
            }
            if let Some(store) = handle.take() {
                debug!("Closing idle review store {}", store.path().display());
                self.open_handles.fetch_sub(1, Ordering::SeqCst);
                closed += 1;
            }

            drop(handle);
            self.release_slot(&content, &slot);
        }
        closed
    }

    /// Close every handle, idle or not
    pub async fn close_all(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().drain().map(|(_, s)| s).collect();
        let mut closed = 0;
        for slot in slots {
            if slot.lock().await.take().is_some() {
                self.open_handles.fetch_sub(1, Ordering::SeqCst);
                closed += 1;
            }
        }
        self.idle.drain();
        closed
    }

    fn open_store(&self, content: &ContentId) -> Result<ReviewDatastore> {
        let path = self.layout.review_store_path(content)?;
        ReviewDatastore::open(&path).map_err(|e| {
            error!("Failed to open review store {}: {}", path.display(), e);
            Error::from(e)
        })
    }

    /// Drop an empty slot from the map unless someone else is waiting on it
    fn release_slot(&self, content: &ContentId, slot: &Slot) {
        let mut slots = self.slots.lock();
        // Ours plus the map's
        if Arc::strong_count(slot) == 2 {
            slots.remove(content);
        }
    }

    async fn with_store<R>(
        &self,
        content: &ContentId,
        op: impl FnOnce(&ReviewDatastore) -> StoreResult<R>,
    ) -> Result<R> {
        let slot = Arc::clone(self.slots.lock().entry(content.clone()).or_default());
        let mut handle = slot.lock().await;

        let store = match &mut *handle {
            Some(store) => store,
            empty => match self.open_store(content) {
                Ok(opened) => {
                    self.open_handles.fetch_add(1, Ordering::SeqCst);
                    empty.insert(opened)
                }
                Err(e) => {
                    drop(handle);
                    self.release_slot(content, &slot);
                    return Err(e);
                }
            },
        };
        self.idle.insert(content.clone(), ());

        op(store).map_err(|e| {
            error!("Review store operation failed for {}: {}", content, e);
            Error::from(e)
        })
    }
}

/// Periodically close idle review stores until the store is dropped
pub fn spawn_idle_evictor(store: &Arc<ReviewStore>, interval: Duration) -> JoinHandle<()> {
    let store: Weak<ReviewStore> = Arc::downgrade(store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(strong) = store.upgrade() else {
                break;
            };
            let closed = strong.evict_idle().await;
            if closed > 0 {
                debug!("Closed {} idle review stores", closed);
            }
        }
    })
}
