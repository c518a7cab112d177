//! Catalog entities persisted in the primary document store.
//!
//! Content items, volumes with their chapters, teams, users (including their
//! personal lists), characters and news posts.

use crate::error::{Error, Result};
use crate::types::{
    ChapterNumber, CharacterId, ContentId, ContentState, Genre, ListName, Locale, NewsId, Role,
    TeamId, UserId, VolumeId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Text in a single locale
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub locale: Locale,
    pub text: String,
}

impl LocalizedText {
    pub fn new(locale: Locale, text: impl Into<String>) -> Self {
        Self {
            locale,
            text: text.into(),
        }
    }
}

/// Pick the entry for `locale`, falling back to the first entry
fn pick_locale(entries: &[LocalizedText], locale: Locale) -> Option<&str> {
    entries
        .iter()
        .find(|e| e.locale == locale)
        .or_else(|| entries.first())
        .map(|e| e.text.as_str())
}

/// Insert or replace the entry for a locale, keeping one entry per locale
fn upsert_locale(entries: &mut Vec<LocalizedText>, locale: Locale, text: String) {
    match entries.iter_mut().find(|e| e.locale == locale) {
        Some(entry) => entry.text = text,
        None => entries.push(LocalizedText { locale, text }),
    }
}

/// Aggregate rating of a content item
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// Running total of all submitted scores
    pub total: f64,
    /// Users whose score is included in `total`
    pub reviewers: Vec<UserId>,
}

impl Rating {
    /// Average score, or zero when nobody has rated yet
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.reviewers.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let count = self.reviewers.len() as f64;
            self.total / count
        }
    }

    /// Add a reviewer's score. Returns false if the reviewer was already counted.
    pub fn add(&mut self, reviewer: &UserId, score: u8) -> bool {
        if self.reviewers.contains(reviewer) {
            return false;
        }
        self.total += f64::from(score);
        self.reviewers.push(reviewer.clone());
        true
    }

    /// Remove a reviewer's score. Returns false if the reviewer was not counted.
    pub fn retract(&mut self, reviewer: &UserId, score: u8) -> bool {
        let Some(pos) = self.reviewers.iter().position(|r| r == reviewer) else {
            return false;
        };
        self.reviewers.remove(pos);
        self.total = (self.total - f64::from(score)).max(0.0);
        true
    }
}

/// A catalog entry representing one serialized work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub names: Vec<LocalizedText>,
    pub descriptions: Vec<LocalizedText>,
    pub explicit: bool,
    pub state: ContentState,
    pub genres: BTreeSet<Genre>,
    pub rating: Rating,
    /// Teams publishing this work, in registration order
    pub translators: Vec<TeamId>,
    pub characters: Vec<CharacterId>,
    /// Cover image file name, if one was uploaded
    pub preview: Option<String>,
    pub views: u64,
    pub released: Option<String>,
}

impl ContentItem {
    /// Create a new content item with a name and description in one locale
    pub fn new(
        id: ContentId,
        locale: Locale,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            names: vec![LocalizedText::new(locale, name)],
            descriptions: vec![LocalizedText::new(locale, description)],
            explicit: false,
            state: ContentState::default(),
            genres: BTreeSet::new(),
            rating: Rating::default(),
            translators: Vec::new(),
            characters: Vec::new(),
            preview: None,
            views: 0,
            released: None,
        }
    }

    /// Display name for a locale, falling back to the first name
    #[must_use]
    pub fn display_name(&self, locale: Locale) -> &str {
        pick_locale(&self.names, locale).unwrap_or_default()
    }

    /// Description for a locale, falling back to the first description
    #[must_use]
    pub fn description(&self, locale: Locale) -> &str {
        pick_locale(&self.descriptions, locale).unwrap_or_default()
    }

    /// Set the name for a locale
    pub fn set_name(&mut self, locale: Locale, name: impl Into<String>) {
        upsert_locale(&mut self.names, locale, name.into());
    }

    /// Set the description for a locale
    pub fn set_description(&mut self, locale: Locale, text: impl Into<String>) {
        upsert_locale(&mut self.descriptions, locale, text.into());
    }

    #[must_use]
    pub fn has_translator(&self, team: &TeamId) -> bool {
        self.translators.contains(team)
    }

    /// Register a team as translator. Idempotent; returns true if the list changed.
    pub fn register_translator(&mut self, team: &TeamId) -> bool {
        if self.has_translator(team) {
            return false;
        }
        self.translators.push(team.clone());
        true
    }
}

/// Cross-reference from a chapter to its screen adaptation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adaptation {
    pub season: u32,
    pub series: u32,
}

/// A numbered, paginated unit of content within a volume
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: ChapterNumber,
    pub name: String,
    /// Page file names in archive order
    pub pages: Vec<String>,
    pub adaptation: Option<Adaptation>,
}

/// An ordered grouping of chapters under one (content item, team) pair
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub content_id: ContentId,
    pub team_id: TeamId,
    pub number: u32,
    /// Always sorted ascending by chapter number
    pub chapters: Vec<Chapter>,
    pub has_preview: bool,
}

impl Volume {
    /// Create a volume holding a single chapter
    #[must_use]
    pub fn new(content_id: ContentId, team_id: TeamId, number: u32, first: Chapter) -> Self {
        Self {
            id: VolumeId::generate(),
            content_id,
            team_id,
            number,
            chapters: vec![first],
            has_preview: false,
        }
    }

    /// Whether this volume sits at the given coordinates
    #[must_use]
    pub fn is_at(&self, content: &ContentId, team: &TeamId, number: u32) -> bool {
        self.number == number && &self.content_id == content && &self.team_id == team
    }

    #[must_use]
    pub fn chapter(&self, number: ChapterNumber) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.number == number)
    }

    /// Insert a chapter, keeping the sequence sorted by number.
    ///
    /// A chapter whose number already exists is rejected; the existing
    /// chapter is left untouched.
    pub fn insert_chapter(&mut self, chapter: Chapter) -> Result<()> {
        if self.chapter(chapter.number).is_some() {
            return Err(Error::ChapterAlreadyExists {
                volume: self.number,
                chapter: chapter.number.to_string(),
            });
        }
        self.chapters.push(chapter);
        self.chapters.sort_by_key(|c| c.number);
        Ok(())
    }

    /// Check the ordering invariant
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.chapters.windows(2).all(|w| w[0].number < w[1].number)
    }
}

/// A group of contributors publishing volumes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub owner: UserId,
    pub members: Vec<UserId>,
    pub photo: Option<String>,
    pub description: Option<String>,
}

impl Team {
    pub fn new(id: TeamId, name: impl Into<String>, owner: UserId) -> Self {
        Self {
            id,
            name: name.into(),
            members: vec![owner.clone()],
            owner,
            photo: None,
            description: None,
        }
    }

    #[must_use]
    pub fn is_member(&self, user: &UserId) -> bool {
        &self.owner == user || self.members.contains(user)
    }
}

/// The three list arrays embedded in a user document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLists {
    pub reading: Vec<ContentId>,
    pub abandoned: Vec<ContentId>,
    pub planned: Vec<ContentId>,
}

impl UserLists {
    #[must_use]
    pub const fn get(&self, list: ListName) -> &Vec<ContentId> {
        match list {
            ListName::Reading => &self.reading,
            ListName::Abandoned => &self.abandoned,
            ListName::Planned => &self.planned,
        }
    }

    pub const fn get_mut(&mut self, list: ListName) -> &mut Vec<ContentId> {
        match list {
            ListName::Reading => &mut self.reading,
            ListName::Abandoned => &mut self.abandoned,
            ListName::Planned => &mut self.planned,
        }
    }

    #[must_use]
    pub fn contains(&self, list: ListName, content: &ContentId) -> bool {
        self.get(list).contains(content)
    }

    /// Append to a list unless already present. Returns true if appended.
    pub fn push(&mut self, list: ListName, content: &ContentId) -> bool {
        let items = self.get_mut(list);
        if items.contains(content) {
            return false;
        }
        items.push(content.clone());
        true
    }

    /// Remove every occurrence from a list. Returns true if anything was removed.
    pub fn remove(&mut self, list: ListName, content: &ContentId) -> bool {
        let items = self.get_mut(list);
        let before = items.len();
        items.retain(|c| c != content);
        items.len() != before
    }

    /// Lists that currently hold the content id
    #[must_use]
    pub fn lists_containing(&self, content: &ContentId) -> Vec<ListName> {
        ListName::ALL
            .into_iter()
            .filter(|&l| self.contains(l, content))
            .collect()
    }
}

/// A user account and its personal lists
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub user_name: String,
    pub email: String,
    pub role: Role,
    pub lists: UserLists,
}

impl User {
    pub fn new(id: UserId, user_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            user_name: user_name.into(),
            email: email.into(),
            role: Role::default(),
            lists: UserLists::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub names: Vec<LocalizedText>,
    pub descriptions: Vec<LocalizedText>,
    pub photo: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct News {
    pub id: NewsId,
    pub title: String,
    pub preview: String,
    pub creator: UserId,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(number: f64) -> Chapter {
        Chapter {
            number: ChapterNumber::new(number).unwrap(),
            name: format!("Chapter {number}"),
            pages: vec!["01.jpg".to_string()],
            adaptation: None,
        }
    }

    #[test]
    fn test_volume_keeps_chapters_sorted() {
        let mut volume = Volume::new(ContentId::new("c1"), TeamId::new("t1"), 1, chapter(3.0));
        volume.insert_chapter(chapter(1.0)).unwrap();
        volume.insert_chapter(chapter(2.5)).unwrap();
        volume.insert_chapter(chapter(2.0)).unwrap();

        let numbers: Vec<f64> = volume.chapters.iter().map(|c| c.number.value()).collect();
        assert_eq!(numbers, vec![1.0, 2.0, 2.5, 3.0]);
        assert!(volume.is_sorted());
    }

    #[test]
    fn test_volume_rejects_duplicate_chapter() {
        let mut volume = Volume::new(ContentId::new("c1"), TeamId::new("t1"), 1, chapter(1.0));
        let mut dup = chapter(1.0);
        dup.name = "Replacement".to_string();

        let err = volume.insert_chapter(dup).unwrap_err();
        assert!(matches!(err, Error::ChapterAlreadyExists { volume: 1, .. }));
        assert_eq!(volume.chapters.len(), 1);
        assert_eq!(volume.chapters[0].name, "Chapter 1");
    }

    #[test]
    fn test_register_translator_is_idempotent() {
        let mut item = ContentItem::new(ContentId::new("c1"), Locale::En, "Name", "Desc");
        let team = TeamId::new("t1");
        assert!(item.register_translator(&team));
        assert!(!item.register_translator(&team));
        assert_eq!(item.translators, vec![team]);
    }

    #[test]
    fn test_display_name_falls_back_to_first() {
        let mut item = ContentItem::new(ContentId::new("c1"), Locale::Ru, "Имя", "Описание");
        assert_eq!(item.display_name(Locale::En), "Имя");
        item.set_name(Locale::En, "Name");
        assert_eq!(item.display_name(Locale::En), "Name");
        assert_eq!(item.display_name(Locale::Ru), "Имя");
        assert_eq!(item.names.len(), 2);
    }

    #[test]
    fn test_user_lists_operations() {
        let mut lists = UserLists::default();
        let c1 = ContentId::new("c1");
        assert!(lists.push(ListName::Reading, &c1));
        assert!(!lists.push(ListName::Reading, &c1));
        assert_eq!(lists.lists_containing(&c1), vec![ListName::Reading]);
        assert!(lists.remove(ListName::Reading, &c1));
        assert!(!lists.remove(ListName::Reading, &c1));
        assert!(lists.lists_containing(&c1).is_empty());
    }

    #[test]
    fn test_rating_add_and_retract() {
        let mut rating = Rating::default();
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        assert!(rating.add(&u1, 8));
        assert!(!rating.add(&u1, 8));
        assert!(rating.add(&u2, 6));
        assert!((rating.average() - 7.0).abs() < f64::EPSILON);
        assert!(rating.retract(&u1, 8));
        assert!(!rating.retract(&u1, 8));
        assert!((rating.total - 6.0).abs() < f64::EPSILON);
    }
}
