//! Review submission and the content rating it feeds.

use std::sync::Arc;
use tankobon_cache::Resolver;
use tankobon_common::{ContentId, ContentItem, Error, KeyedLocks, Result, UserId};
use tankobon_store::{Document, DocumentStore};
use tracing::{error, info};

use crate::datastore::ReviewRecord;
use crate::facade::ReviewStore;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

pub struct ReviewService {
    reviews: Arc<ReviewStore>,
    content: Arc<Resolver<ContentItem>>,
    locks: KeyedLocks<ContentId>,
}

impl ReviewService {
    pub fn new(reviews: Arc<ReviewStore>, content: Arc<Resolver<ContentItem>>) -> Self {
        Self {
            reviews,
            content,
            locks: KeyedLocks::new(),
        }
    }

    pub fn reviews(&self) -> &Arc<ReviewStore> {
        &self.reviews
    }

    /// Record a user's review and add its score to the content rating
    pub async fn submit(
        &self,
        content: &ContentId,
        user: &UserId,
        score: u8,
    ) -> Result<ReviewRecord> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(Error::invalid_argument(format!(
                "score must be between {MIN_SCORE} and {MAX_SCORE}, got {score}"
            )));
        }

        let _guard = self.locks.lock(content.clone()).await;
        self.content.find_by_id(content.as_str()).await?;
        if self.reviews.has_review(content, user).await? {
            return Err(Error::AlreadyReviewed {
                content: content.to_string(),
                user: user.to_string(),
            });
        }

        let record = self
            .reviews
            .insert_review(content, ReviewRecord::new(user.clone(), Some(score)))
            .await?;

        if let Err(e) = self.update_rating(content, |item| item.rating.add(user, score)).await {
            error!(
                "Rating update failed for {} after review by {}, withdrawing review: {}",
                content, user, e
            );
            self.reviews.remove_review(content, user).await?;
            return Err(e);
        }

        info!("{} reviewed {} with score {}", user, content, score);
        Ok(record)
    }

    /// Withdraw a user's review and its score
    pub async fn retract(&self, content: &ContentId, user: &UserId) -> Result<ReviewRecord> {
        let _guard = self.locks.lock(content.clone()).await;
        let record = self
            .reviews
            .find_review(content, user)
            .await?
            .ok_or_else(|| Error::ReviewNotFound {
                content: content.to_string(),
                user: user.to_string(),
            })?;

        self.reviews.remove_review(content, user).await?;
        if let Some(score) = record.score {
            self.update_rating(content, |item| item.rating.retract(user, score))
                .await?;
        }

        info!("{} withdrew review of {}", user, content);
        Ok(record)
    }

    /// Read the stored item (not the cached snapshot), apply `change` and
    /// write it back when it reports a modification
    async fn update_rating(
        &self,
        content: &ContentId,
        change: impl FnOnce(&mut ContentItem) -> bool,
    ) -> Result<()> {
        let store = self.content.store();
        let mut item = store
            .find_by_id(content.as_str())
            .await?
            .ok_or_else(|| ContentItem::not_found(content.as_str()))?;
        if change(&mut item) {
            store.save(&item).await?;
            self.content.invalidate(content.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tankobon_common::{Locale, StorageLayout};
    use tankobon_store::RedbDocumentStore;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        docs: Arc<RedbDocumentStore>,
        content: Arc<Resolver<ContentItem>>,
        service: ReviewService,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let docs = Arc::new(RedbDocumentStore::open(dir.path().join("documents.redb")).unwrap());
        docs.insert(&ContentItem::new(ContentId::new("c1"), Locale::En, "Name", "Desc"))
            .await
            .unwrap();

        let content = Arc::new(Resolver::<ContentItem>::new(
            docs.clone(),
            Duration::from_secs(60),
        ));
        let reviews = Arc::new(ReviewStore::new(
            StorageLayout::new(dir.path().to_path_buf()),
            Duration::from_secs(60),
        ));
        Fixture {
            _dir: dir,
            docs,
            service: ReviewService::new(reviews, content.clone()),
            content,
        }
    }

    #[tokio::test]
    async fn test_submit_updates_rating() {
        let fx = fixture().await;
        let c1 = ContentId::new("c1");

        // Warm the cache; submit must invalidate it
        fx.content.find_by_id("c1").await.unwrap();
        fx.service.submit(&c1, &UserId::new("u1"), 8).await.unwrap();
        fx.service.submit(&c1, &UserId::new("u2"), 4).await.unwrap();

        let item = fx.content.find_by_id("c1").await.unwrap();
        assert_eq!(item.rating.reviewers.len(), 2);
        assert!((item.rating.average() - 6.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_second_review_conflicts() {
        let fx = fixture().await;
        let (c1, u1) = (ContentId::new("c1"), UserId::new("u1"));
        fx.service.submit(&c1, &u1, 5).await.unwrap();

        let err = fx.service.submit(&c1, &u1, 9).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyReviewed { .. }));
        assert_eq!(err.http_status_code(), 409);
        assert_eq!(fx.service.reviews().list_reviews(&c1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_score_and_unknown_content() {
        let fx = fixture().await;
        let u1 = UserId::new("u1");

        let err = fx.service.submit(&ContentId::new("c1"), &u1, 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = fx.service.submit(&ContentId::new("c1"), &u1, 11).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = fx.service.submit(&ContentId::new("c9"), &u1, 5).await.unwrap_err();
        assert!(matches!(err, Error::ContentNotFound(_)));
        assert_eq!(fx.service.reviews().open_handles(), 0);
    }

    #[tokio::test]
    async fn test_retract() {
        let fx = fixture().await;
        let (c1, u1) = (ContentId::new("c1"), UserId::new("u1"));
        fx.service.submit(&c1, &u1, 7).await.unwrap();

        let record = fx.service.retract(&c1, &u1).await.unwrap();
        assert_eq!(record.score, Some(7));
        assert!(!fx.service.reviews().has_review(&c1, &u1).await.unwrap());

        let stored = DocumentStore::<ContentItem>::find_by_id(&*fx.docs, "c1")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.rating.reviewers.is_empty());
        assert!(stored.rating.total.abs() < f64::EPSILON);

        let err = fx.service.retract(&c1, &u1).await.unwrap_err();
        assert!(matches!(err, Error::ReviewNotFound { .. }));
    }
}
