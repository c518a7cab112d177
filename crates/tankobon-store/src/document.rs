//! Primary document store abstraction.
//!
//! Catalog entities are stored as whole documents keyed by id. The store is
//! consumed through [`DocumentStore`], one trait object per entity type, so
//! the services above it can run against redb in production and against
//! stubs in tests.

use async_trait::async_trait;
use redb::TableDefinition;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tankobon_common::{Character, ContentItem, Error, News, Team, User, Volume};

use crate::error::StoreResult;
use crate::tables;

/// Document collection (one redb table each)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Content,
    Volumes,
    Teams,
    Users,
    Characters,
    News,
}

impl Collection {
    pub const ALL: [Self; 6] = [
        Self::Content,
        Self::Volumes,
        Self::Teams,
        Self::Users,
        Self::Characters,
        Self::News,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Volumes => "volume",
            Self::Teams => "team",
            Self::Users => "user",
            Self::Characters => "character",
            Self::News => "news",
        }
    }

    pub(crate) const fn table(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Self::Content => tables::CONTENT,
            Self::Volumes => tables::VOLUMES,
            Self::Teams => tables::TEAMS,
            Self::Users => tables::USERS,
            Self::Characters => tables::CHARACTERS,
            Self::News => tables::NEWS,
        }
    }
}

/// An entity stored as a document
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    /// Document id
    fn key(&self) -> &str;

    /// Error reported when a document with this id does not exist
    fn not_found(id: &str) -> Error {
        Error::DocumentNotFound {
            collection: Self::COLLECTION.name(),
            id: id.to_string(),
        }
    }
}

impl Document for ContentItem {
    const COLLECTION: Collection = Collection::Content;

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn not_found(id: &str) -> Error {
        Error::ContentNotFound(id.to_string())
    }
}

impl Document for Volume {
    const COLLECTION: Collection = Collection::Volumes;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Document for Team {
    const COLLECTION: Collection = Collection::Teams;

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn not_found(id: &str) -> Error {
        Error::TeamNotFound(id.to_string())
    }
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn not_found(id: &str) -> Error {
        Error::UserNotFound(id.to_string())
    }
}

impl Document for Character {
    const COLLECTION: Collection = Collection::Characters;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Document for News {
    const COLLECTION: Collection = Collection::News;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// Predicate used by [`DocumentStore::find_one`] and [`DocumentStore::find_all`]
pub type Filter<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// Durable structured storage for one document type.
///
/// "Not found" is reported as `Ok(None)` / `Ok(false)`; `Err` always means
/// the store itself failed.
#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<T>>;

    /// First document (in id order) matching the filter
    async fn find_one(&self, filter: Filter<'_, T>) -> StoreResult<Option<T>>;

    /// Every document matching the filter, in id order
    async fn find_all(&self, filter: Filter<'_, T>) -> StoreResult<Vec<T>>;

    /// Create a document; fails if the id is taken
    async fn insert(&self, doc: &T) -> StoreResult<()>;

    /// Create or replace a document
    async fn save(&self, doc: &T) -> StoreResult<()>;

    /// Delete a document. Returns false if it did not exist.
    async fn remove(&self, id: &str) -> StoreResult<bool>;
}
