//! View counter aggregation.
//!
//! Views are counted in memory per content item and written back to
//! `ContentItem.views` once the counter's TTL elapses, so a burst of page
//! loads costs one document write instead of one per view.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tankobon_common::{ContentId, ContentItem, Result};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::resolver::Resolver;
use crate::ttl::TtlCache;

/// In-memory view counters with delayed write-back
pub struct ViewCounter {
    content: Arc<Resolver<ContentItem>>,
    pending: TtlCache<ContentId, u64>,
}

impl ViewCounter {
    /// Counters are written back `flush_after` their first view
    pub fn new(content: Arc<Resolver<ContentItem>>, flush_after: Duration) -> Self {
        Self {
            content,
            pending: TtlCache::new(flush_after),
        }
    }

    /// Count one view
    pub fn record_view(&self, content: &ContentId) {
        self.pending.upsert(content.clone(), 1, |n| *n += 1);
    }

    /// Views counted but not yet written back
    pub fn pending(&self, content: &ContentId) -> u64 {
        self.pending.peek(content).unwrap_or(0)
    }

    /// Write back every counter whose TTL elapsed. Returns the number of
    /// content items updated.
    pub async fn flush_expired(&self) -> Result<usize> {
        let batch = self.pending.take_expired();
        self.persist(batch).await
    }

    /// Write back every counter now, expired or not
    pub async fn flush_all(&self) -> Result<usize> {
        let batch = self.pending.drain();
        let flushed = self.persist(batch).await?;
        if flushed > 0 {
            info!("Flushed view counters for {} content items", flushed);
        }
        Ok(flushed)
    }

    /// Add counts to the stored documents. Failed counts are put back so the
    /// next flush retries them; the first failure is returned after the whole
    /// batch was attempted.
    async fn persist(&self, batch: Vec<(ContentId, u64)>) -> Result<usize> {
        let store = self.content.store();
        let mut flushed = 0;
        let mut first_error = None;

        for (id, count) in batch {
            let outcome = match store.find_by_id(id.as_str()).await {
                Ok(Some(mut item)) => {
                    item.views = item.views.saturating_add(count);
                    store.save(&item).await.map(|()| true)
                }
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(true) => {
                    self.content.invalidate(id.as_str());
                    flushed += 1;
                }
                Ok(false) => {
                    debug!("Dropping {} views for missing content {}", count, id);
                }
                Err(e) => {
                    error!("Failed to write {} views for {}: {}", count, id, e);
                    self.pending.upsert(id, count, |n| *n += count);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(flushed),
        }
    }
}

/// Periodically write back expired counters until the counter is dropped
pub fn spawn_flusher(counter: &Arc<ViewCounter>, interval: Duration) -> JoinHandle<()> {
    let counter: Weak<ViewCounter> = Arc::downgrade(counter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(strong) = counter.upgrade() else {
                break;
            };
            if let Err(e) = strong.flush_expired().await {
                error!("View counter flush failed: {}", e);
            }
        }
    })
}
