//! On-disk layout and public URLs.
//!
//! Extracted chapter pages live under
//! `<root>/pages/<team>/<content>/<volume>/<chapter>/`. Page URLs are built
//! from the same coordinates, so a written path must never move.

use crate::error::{Error, Result};
use crate::types::{ChapterNumber, ContentId, TeamId};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DOCUMENTS_DB: &str = "documents.redb";
const LISTS_DB: &str = "lists.redb";
const REVIEWS_DIR: &str = "reviews";
const PAGES_DIR: &str = "pages";
const TEMP_DIR: &str = "temp";

/// Reject identifiers that would escape their directory
fn path_segment(id: &str) -> Result<&str> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\'])
        || id.contains('\0')
    {
        return Err(Error::InvalidId(id.to_string()));
    }
    Ok(id)
}

/// Paths of every file and directory owned by Tankobon
#[derive(Clone, Debug)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Primary document store file
    #[must_use]
    pub fn documents_db(&self) -> PathBuf {
        self.root.join(DOCUMENTS_DB)
    }

    /// List membership index file
    #[must_use]
    pub fn lists_db(&self) -> PathBuf {
        self.root.join(LISTS_DB)
    }

    #[must_use]
    pub fn reviews_dir(&self) -> PathBuf {
        self.root.join(REVIEWS_DIR)
    }

    /// Review store file for one content item
    pub fn review_store_path(&self, content: &ContentId) -> Result<PathBuf> {
        let segment = path_segment(content.as_str())?;
        Ok(self.reviews_dir().join(format!("{segment}.redb")))
    }

    #[must_use]
    pub fn pages_dir(&self) -> PathBuf {
        self.root.join(PAGES_DIR)
    }

    /// Directory holding the extracted pages of one chapter
    pub fn chapter_dir(
        &self,
        team: &TeamId,
        content: &ContentId,
        volume: u32,
        chapter: ChapterNumber,
    ) -> Result<PathBuf> {
        Ok(self
            .pages_dir()
            .join(path_segment(team.as_str())?)
            .join(path_segment(content.as_str())?)
            .join(volume.to_string())
            .join(chapter.to_string()))
    }

    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR)
    }

    /// Fresh path for a temporary upload artifact
    #[must_use]
    pub fn temp_upload_path(&self) -> PathBuf {
        self.temp_dir()
            .join(format!("{}.upload", Uuid::new_v4().simple()))
    }

    /// Create the fixed directories under the root
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.reviews_dir(), self.pages_dir(), self.temp_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Kind of entity a preview image belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewKind {
    Content,
    Volume,
    Team,
    Character,
    News,
}

impl fmt::Display for PreviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Content => "manga",
            Self::Volume => "volume",
            Self::Team => "team",
            Self::Character => "character",
            Self::News => "news",
        })
    }
}

/// Builds externally visible URLs for stored files
#[derive(Clone, Debug)]
pub struct PublicUrls {
    host: String,
}

impl PublicUrls {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            host: host.trim_end_matches('/').to_string(),
        }
    }

    /// URL of a single chapter page
    #[must_use]
    pub fn chapter_page(
        &self,
        team: &TeamId,
        content: &ContentId,
        volume: u32,
        chapter: ChapterNumber,
        file: &str,
    ) -> String {
        format!(
            "{}/storage/pages/{team}/{content}/{volume}/{chapter}/{file}",
            self.host
        )
    }

    /// URL of a preview image, or the placeholder when none was uploaded
    #[must_use]
    pub fn preview(&self, kind: PreviewKind, file: Option<&str>) -> String {
        format!(
            "{}/storage/preview/{kind}/{}.jpg",
            self.host,
            file.unwrap_or("empty")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_dir_layout() {
        let layout = StorageLayout::new("/data");
        let dir = layout
            .chapter_dir(
                &TeamId::new("t1"),
                &ContentId::new("c1"),
                3,
                ChapterNumber::new(12.5).unwrap(),
            )
            .unwrap();
        assert_eq!(dir, PathBuf::from("/data/pages/t1/c1/3/12.5"));
    }

    #[test]
    fn test_chapter_dir_rejects_traversal() {
        let layout = StorageLayout::new("/data");
        let err = layout
            .chapter_dir(
                &TeamId::new(".."),
                &ContentId::new("c1"),
                1,
                ChapterNumber::from(1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidId(_)));
        assert!(layout.review_store_path(&ContentId::new("a/b")).is_err());
    }

    #[test]
    fn test_temp_upload_paths_are_unique() {
        let layout = StorageLayout::new("/data");
        let a = layout.temp_upload_path();
        let b = layout.temp_upload_path();
        assert_ne!(a, b);
        assert!(a.starts_with("/data/temp"));
    }

    #[test]
    fn test_public_urls() {
        let urls = PublicUrls::new("https://cdn.example.org/");
        assert_eq!(
            urls.chapter_page(
                &TeamId::new("t1"),
                &ContentId::new("c1"),
                1,
                ChapterNumber::from(2),
                "01.png"
            ),
            "https://cdn.example.org/storage/pages/t1/c1/1/2/01.png"
        );
        assert_eq!(
            urls.preview(PreviewKind::Content, None),
            "https://cdn.example.org/storage/preview/manga/empty.jpg"
        );
    }
}
