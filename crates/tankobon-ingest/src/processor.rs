//! Chapter ingestion.
//!
//! An upload moves through three stages, strictly in order:
//!
//! 1. **Prepare** - resolve the team and content item, validate the archive,
//!    load the target volume and reject a duplicate chapter number. Any
//!    failure here discards the upload artifact and leaves no trace.
//! 2. **Extract** - unpack the pages into the chapter directory.
//! 3. **Commit** - write the volume, then register the team as translator.
//!
//! The artifact is deleted only once the commit succeeded. A failed commit
//! leaves the extracted directory and the artifact in place; nothing cleans
//! those up automatically.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tankobon_cache::Resolver;
use tankobon_common::{
    Adaptation, Chapter, ChapterNumber, ContentId, ContentItem, Error, KeyedLocks, Result,
    StorageLayout, Team, TeamId, Volume,
};
use tankobon_store::{Document, DocumentStore};
use tracing::{debug, error, info, warn};

use crate::archive::{self, ArchivePolicy, ValidatedArchive};

/// One chapter upload
#[derive(Clone, Debug)]
pub struct ChapterUpload {
    pub content: ContentId,
    pub team: TeamId,
    pub volume: u32,
    pub chapter: ChapterNumber,
    pub name: String,
    pub adaptation: Option<Adaptation>,
    /// Temporary archive file. Ownership passes to the processor.
    pub artifact: PathBuf,
}

/// Result of a successful ingestion
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Page file names in archive order
    pub pages: Vec<String>,
    /// Whether the upload created its volume
    pub created_volume: bool,
    /// Whether the team was newly registered as translator
    pub registered_translator: bool,
}

struct Prepared {
    content: Arc<ContentItem>,
    archive: ValidatedArchive,
    volume: Option<Volume>,
    chapter_dir: PathBuf,
}

type VolumeKey = (ContentId, TeamId, u32);

/// Validates, extracts and catalogs chapter archives
pub struct IngestProcessor {
    layout: StorageLayout,
    policy: ArchivePolicy,
    content: Arc<Resolver<ContentItem>>,
    teams: Arc<Resolver<Team>>,
    volumes: Arc<dyn DocumentStore<Volume>>,
    locks: KeyedLocks<VolumeKey>,
}

impl IngestProcessor {
    pub fn new(
        layout: StorageLayout,
        policy: ArchivePolicy,
        content: Arc<Resolver<ContentItem>>,
        teams: Arc<Resolver<Team>>,
        volumes: Arc<dyn DocumentStore<Volume>>,
    ) -> Self {
        Self {
            layout,
            policy,
            content,
            teams,
            volumes,
            locks: KeyedLocks::new(),
        }
    }

    /// Ingest one chapter archive.
    ///
    /// Uploads targeting the same volume are processed one at a time.
    pub async fn ingest(&self, upload: ChapterUpload) -> Result<IngestOutcome> {
        let _guard = self
            .locks
            .lock((upload.content.clone(), upload.team.clone(), upload.volume))
            .await;

        let prepared = match self.prepare(&upload).await {
            Ok(prepared) => prepared,
            Err(e) => {
                debug!(
                    "Rejected chapter {} of volume {} for {}: {}",
                    upload.chapter, upload.volume, upload.content, e
                );
                discard_artifact(&upload.artifact).await;
                return Err(e);
            }
        };

        if let Err(e) = extract(&prepared).await {
            error!(
                "Failed to extract chapter {} of volume {} for {}: {}",
                upload.chapter, upload.volume, upload.content, e
            );
            remove_partial_dir(&prepared.chapter_dir).await;
            discard_artifact(&upload.artifact).await;
            return Err(e);
        }

        let outcome = match self.commit(&upload, prepared).await {
            Ok(outcome) => outcome,
            Err((e, chapter_dir)) => {
                error!(
                    "Failed to record chapter {} of volume {} for {}: {}; pages left at {}",
                    upload.chapter,
                    upload.volume,
                    upload.content,
                    e,
                    chapter_dir.display()
                );
                return Err(e);
            }
        };

        discard_artifact(&upload.artifact).await;
        info!(
            "Ingested chapter {} of volume {} for {} by team {} ({} pages)",
            upload.chapter,
            upload.volume,
            upload.content,
            upload.team,
            outcome.pages.len()
        );
        Ok(outcome)
    }

    async fn prepare(&self, upload: &ChapterUpload) -> Result<Prepared> {
        self.teams.find_by_id(upload.team.as_str()).await?;
        let content = self.content.find_by_id(upload.content.as_str()).await?;
        let chapter_dir =
            self.layout
                .chapter_dir(&upload.team, &upload.content, upload.volume, upload.chapter)?;

        let archive = {
            let path = upload.artifact.clone();
            let policy = self.policy.clone();
            tokio::task::spawn_blocking(move || archive::inspect(&path, &policy))
                .await
                .map_err(|e| Error::internal(format!("archive inspection aborted: {e}")))??
        };

        let (content_id, team_id, number) =
            (upload.content.clone(), upload.team.clone(), upload.volume);
        let volume = self
            .volumes
            .find_one(&move |v: &Volume| v.is_at(&content_id, &team_id, number))
            .await?;

        if let Some(volume) = &volume
            && volume.chapter(upload.chapter).is_some()
        {
            return Err(Error::ChapterAlreadyExists {
                volume: volume.number,
                chapter: upload.chapter.to_string(),
            });
        }

        Ok(Prepared {
            content,
            archive,
            volume,
            chapter_dir,
        })
    }

    /// Write the volume and the translator registration. On failure the
    /// chapter directory is handed back for reporting.
    async fn commit(
        &self,
        upload: &ChapterUpload,
        prepared: Prepared,
    ) -> std::result::Result<IngestOutcome, (Error, PathBuf)> {
        let Prepared {
            content,
            archive,
            volume,
            chapter_dir,
        } = prepared;
        let pages = archive.pages().to_vec();
        let chapter = Chapter {
            number: upload.chapter,
            name: upload.name.clone(),
            pages: pages.clone(),
            adaptation: upload.adaptation,
        };

        let created_volume = volume.is_none();
        let written = match volume {
            None => {
                let volume = Volume::new(
                    upload.content.clone(),
                    upload.team.clone(),
                    upload.volume,
                    chapter,
                );
                self.volumes.insert(&volume).await.map_err(Error::from)
            }
            Some(mut volume) => match volume.insert_chapter(chapter) {
                Ok(()) => self.volumes.save(&volume).await.map_err(Error::from),
                Err(e) => Err(e),
            },
        };
        if let Err(e) = written {
            return Err((e, chapter_dir));
        }

        let registered_translator = if content.has_translator(&upload.team) {
            false
        } else {
            match self.register_translator(&upload.content, &upload.team).await {
                Ok(changed) => changed,
                Err(e) => return Err((e, chapter_dir)),
            }
        };

        Ok(IngestOutcome {
            pages,
            created_volume,
            registered_translator,
        })
    }

    /// Append the team to the content item's translators, reading the
    /// current document rather than the cached snapshot
    async fn register_translator(&self, content: &ContentId, team: &TeamId) -> Result<bool> {
        let store = self.content.store();
        let mut item = store
            .find_by_id(content.as_str())
            .await?
            .ok_or_else(|| ContentItem::not_found(content.as_str()))?;

        if !item.register_translator(team) {
            return Ok(false);
        }
        store.save(&item).await?;
        self.content.invalidate(content.as_str());
        debug!("Registered team {} as translator of {}", team, content);
        Ok(true)
    }
}

async fn extract(prepared: &Prepared) -> Result<()> {
    let archive = prepared.archive.clone();
    let dest = prepared.chapter_dir.clone();
    tokio::task::spawn_blocking(move || archive.extract(&dest))
        .await
        .map_err(|e| Error::internal(format!("archive extraction aborted: {e}")))?
}

async fn discard_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove upload artifact {}: {}", path.display(), e),
    }
}

async fn remove_partial_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove partial chapter dir {}: {}", dir.display(), e);
    }
}
