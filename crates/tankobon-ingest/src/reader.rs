//! Read side of the chapter catalog: chapter pages, chapter and volume
//! listings, translator teams.

use serde::Serialize;
use std::sync::Arc;
use tankobon_cache::Resolver;
use tankobon_common::{
    ChapterNumber, ContentId, ContentItem, Error, PreviewKind, PublicUrls, Result, Team, TeamId,
    Volume,
};
use tankobon_store::DocumentStore;

/// A chapter with its page URLs in reading order
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChapterView {
    pub name: String,
    pub pages: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChapterSummary {
    pub number: ChapterNumber,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VolumeSummary {
    pub team: TeamId,
    pub number: u32,
    /// Preview image URL, or the placeholder
    pub preview: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TeamSummary {
    pub id: TeamId,
    pub name: String,
}

/// Read-only queries over volumes and chapters
pub struct ChapterReader {
    content: Arc<Resolver<ContentItem>>,
    teams: Arc<Resolver<Team>>,
    volumes: Arc<dyn DocumentStore<Volume>>,
    urls: PublicUrls,
}

impl ChapterReader {
    pub fn new(
        content: Arc<Resolver<ContentItem>>,
        teams: Arc<Resolver<Team>>,
        volumes: Arc<dyn DocumentStore<Volume>>,
        urls: PublicUrls,
    ) -> Self {
        Self {
            content,
            teams,
            volumes,
            urls,
        }
    }

    async fn volume(&self, content: &ContentId, team: &TeamId, number: u32) -> Result<Volume> {
        let (c, t) = (content.clone(), team.clone());
        self.volumes
            .find_one(&move |v: &Volume| v.is_at(&c, &t, number))
            .await?
            .ok_or_else(|| Error::VolumeNotFound {
                content: content.to_string(),
                team: team.to_string(),
                number,
            })
    }

    /// Page URLs of one chapter
    pub async fn chapter(
        &self,
        content: &ContentId,
        team: &TeamId,
        volume: u32,
        chapter: ChapterNumber,
    ) -> Result<ChapterView> {
        self.teams.find_by_id(team.as_str()).await?;
        self.content.find_by_id(content.as_str()).await?;
        let volume = self.volume(content, team, volume).await?;

        let found = volume
            .chapter(chapter)
            .ok_or_else(|| Error::ChapterNotFound {
                volume: volume.number,
                chapter: chapter.to_string(),
            })?;

        let pages = found
            .pages
            .iter()
            .map(|page| self.urls.chapter_page(team, content, volume.number, chapter, page))
            .collect();
        Ok(ChapterView {
            name: found.name.clone(),
            pages,
        })
    }

    /// Chapters of one volume in ascending order
    pub async fn chapters(
        &self,
        content: &ContentId,
        team: &TeamId,
        volume: u32,
    ) -> Result<Vec<ChapterSummary>> {
        self.content.find_by_id(content.as_str()).await?;
        let volume = self.volume(content, team, volume).await?;
        Ok(volume
            .chapters
            .iter()
            .map(|c| ChapterSummary {
                number: c.number,
                name: c.name.clone(),
            })
            .collect())
    }

    /// Every volume of a content item, highest number first
    pub async fn volumes(&self, content: &ContentId) -> Result<Vec<VolumeSummary>> {
        self.content.find_by_id(content.as_str()).await?;
        let id = content.clone();
        let mut volumes = self
            .volumes
            .find_all(&move |v: &Volume| v.content_id == id)
            .await?;
        volumes.sort_by(|a, b| b.number.cmp(&a.number).then_with(|| a.team_id.cmp(&b.team_id)));

        Ok(volumes
            .into_iter()
            .map(|v| VolumeSummary {
                preview: self.urls.preview(
                    PreviewKind::Volume,
                    v.has_preview.then_some(v.id.as_str()),
                ),
                team: v.team_id,
                number: v.number,
            })
            .collect())
    }

    /// Teams translating a content item, in registration order. Teams that
    /// no longer exist are skipped.
    pub async fn translators(&self, content: &ContentId) -> Result<Vec<TeamSummary>> {
        let item = self.content.find_by_id(content.as_str()).await?;
        let mut result = Vec::with_capacity(item.translators.len());
        for id in &item.translators {
            if let Some(team) = self.teams.try_find_by_id(id.as_str()).await? {
                result.push(TeamSummary {
                    id: team.id.clone(),
                    name: team.name.clone(),
                });
            }
        }
        Ok(result)
    }
}
