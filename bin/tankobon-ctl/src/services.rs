//! Process-wide services, built once from the configuration

use anyhow::Result;
use std::sync::Arc;
use tankobon_cache::{Resolver, ViewCounter};
use tankobon_common::{Config, ContentItem, StorageLayout, Team};
use tankobon_ingest::{ArchivePolicy, ChapterReader, IngestProcessor};
use tankobon_lists::{ListMembershipEngine, Reconciler};
use tankobon_reviews::{ReviewService, ReviewStore};
use tankobon_store::{RedbDocumentStore, RedbIndexStore};
use tracing::{info, warn};

pub struct Services {
    pub layout: StorageLayout,
    pub docs: Arc<RedbDocumentStore>,
    pub ingest: IngestProcessor,
    pub reader: ChapterReader,
    pub lists: Arc<ListMembershipEngine>,
    pub reconciler: Reconciler,
    pub reviews: ReviewService,
    pub views: ViewCounter,
}

impl Services {
    pub fn open(config: &Config) -> Result<Self> {
        let layout = config.layout();
        layout.ensure_dirs()?;
        let urls = config.urls();

        let docs = Arc::new(RedbDocumentStore::open(layout.documents_db())?);
        let index = Arc::new(RedbIndexStore::open(layout.lists_db())?);
        info!("Opened storage under {}", layout.root().display());

        let content = Arc::new(Resolver::<ContentItem>::new(
            docs.clone(),
            config.cache.resolver_ttl(),
        ));
        let teams = Arc::new(Resolver::<Team>::new(
            docs.clone(),
            config.cache.resolver_ttl(),
        ));

        let ingest = IngestProcessor::new(
            layout.clone(),
            ArchivePolicy::from_config(&config.ingest),
            content.clone(),
            teams.clone(),
            docs.clone(),
        );
        let reader = ChapterReader::new(content.clone(), teams, docs.clone(), urls.clone());

        let lists = Arc::new(ListMembershipEngine::new(
            index,
            docs.clone(),
            content.clone(),
            urls,
            config.lists.default_page_size,
        ));
        let reconciler = Reconciler::new(lists.clone());

        let review_store = Arc::new(ReviewStore::new(
            layout.clone(),
            config.cache.review_idle_ttl(),
        ));
        let reviews = ReviewService::new(review_store, content.clone());
        let views = ViewCounter::new(content, config.cache.viewer_flush_ttl());

        Ok(Self {
            layout,
            docs,
            ingest,
            reader,
            lists,
            reconciler,
            reviews,
            views,
        })
    }

    /// Write back pending view counts and close open review stores
    pub async fn shutdown(&self) {
        if let Err(e) = self.views.flush_all().await {
            warn!("Failed to flush view counters: {}", e);
        }
        let closed = self.reviews.reviews().close_all().await;
        if closed > 0 {
            info!("Closed {} review stores", closed);
        }
    }
}
