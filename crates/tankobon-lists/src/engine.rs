//! List membership engine.
//!
//! Membership of a content item in one of a user's lists is recorded twice:
//! as an index record `"<user>_<content>" -> list` and as an entry in the
//! matching array of the user document. The two stores share no
//! transaction, so every operation writes the index first and the document
//! second. A crash or failure between the two leaves the index ahead of the
//! document; [`crate::Reconciler`] detects and repairs that state.
//!
//! Operations on the same (user, content) pair are serialized. Updates of
//! one user document are serialized separately, so concurrent operations on
//! different items of the same user never overwrite each other's array
//! changes.

use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tankobon_cache::Resolver;
use tankobon_common::{
    ContentId, ContentItem, Error, KeyedLocks, ListName, Locale, PreviewKind, PublicUrls, Result,
    User, UserId, UserLists,
};
use tankobon_store::{Document, DocumentStore, IndexStore, membership_key};
use tracing::{debug, info, warn};

/// Make `list` the only array holding the item
pub(crate) fn place(lists: &mut UserLists, content: &ContentId, list: ListName) {
    for name in ListName::ALL {
        lists.remove(name, content);
    }
    lists.push(list, content);
}

/// A list entry with display data
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub id: ContentId,
    pub name: String,
    pub description: String,
    pub preview: String,
}

/// Keeps the list index and the user documents in agreement
pub struct ListMembershipEngine {
    pub(crate) index: Arc<dyn IndexStore>,
    pub(crate) users: Arc<dyn DocumentStore<User>>,
    content: Arc<Resolver<ContentItem>>,
    urls: PublicUrls,
    pair_locks: KeyedLocks<String>,
    pub(crate) user_locks: KeyedLocks<UserId>,
    default_page_size: usize,
}

impl ListMembershipEngine {
    pub fn new(
        index: Arc<dyn IndexStore>,
        users: Arc<dyn DocumentStore<User>>,
        content: Arc<Resolver<ContentItem>>,
        urls: PublicUrls,
        default_page_size: usize,
    ) -> Self {
        Self {
            index,
            users,
            content,
            urls,
            pair_locks: KeyedLocks::new(),
            user_locks: KeyedLocks::new(),
            default_page_size: default_page_size.max(1),
        }
    }

    /// Put a content item into a list, moving it out of any other list
    pub async fn move_to_list(
        &self,
        user: &UserId,
        content: &ContentId,
        list: ListName,
    ) -> Result<()> {
        let key = membership_key(user, content);
        let _pair = self.pair_locks.lock(key.clone()).await;
        self.load_user(user).await?;

        match self.current_list(&key).await? {
            Some(current) if current == list => Err(Error::AlreadyInList {
                content: content.to_string(),
                list: list.to_string(),
            }),
            None => {
                self.index.set(&key, list.as_str()).await?;
                self.update_lists(user, &key, |lists| {
                    let stray = lists.lists_containing(content);
                    if !stray.is_empty() {
                        warn!(
                            "{} of {} held by lists {:?} without an index record",
                            content, user, stray
                        );
                    }
                    place(lists, content, list);
                    Ok(())
                })
                .await?;
                debug!("Added {} to list {} of {}", content, list, user);
                Ok(())
            }
            Some(previous) => {
                self.index.set(&key, list.as_str()).await?;
                self.update_lists(user, &key, |lists| {
                    place(lists, content, list);
                    Ok(())
                })
                .await?;
                debug!(
                    "Moved {} of {} from list {} to {}",
                    content, user, previous, list
                );
                Ok(())
            }
        }
    }

    /// Take a content item out of whichever list holds it. Returns that list.
    pub async fn remove_from_lists(&self, user: &UserId, content: &ContentId) -> Result<ListName> {
        let key = membership_key(user, content);
        let _pair = self.pair_locks.lock(key.clone()).await;
        let doc = self.load_user(user).await?;

        let Some(list) = self.current_list(&key).await? else {
            let holding = doc.lists.lists_containing(content);
            if holding.is_empty() {
                return Err(Error::IndexKeyNotFound(key));
            }
            warn!(
                "No index record for {} but lists {:?} of {} hold it",
                content, holding, user
            );
            return Err(Error::Inconsistency {
                key,
                detail: format!("no index record, but present in {holding:?}"),
            });
        };

        self.index.delete(&key).await?;
        self.update_lists(user, &key, |lists| {
            if lists.remove(list, content) {
                return Ok(());
            }
            let holding = lists.lists_containing(content);
            if holding.is_empty() {
                Err(Error::NotInList {
                    content: content.to_string(),
                    list: list.to_string(),
                })
            } else {
                warn!(
                    "Index put {} in list {} of {} but lists {:?} hold it",
                    content, list, user, holding
                );
                Err(Error::Inconsistency {
                    key: key.clone(),
                    detail: format!("indexed in {list}, present in {holding:?}"),
                })
            }
        })
        .await?;

        debug!("Removed {} from list {} of {}", content, list, user);
        Ok(list)
    }

    /// List currently holding the content item, according to the index
    pub async fn membership(&self, user: &UserId, content: &ContentId) -> Result<Option<ListName>> {
        self.current_list(&membership_key(user, content)).await
    }

    /// A page of one list. `count` defaults to the configured page size and
    /// must be at least one.
    pub async fn list(
        &self,
        user: &UserId,
        list: ListName,
        offset: usize,
        count: Option<usize>,
    ) -> Result<Vec<ContentId>> {
        let count = self.page_size(count)?;
        let doc = self.load_user(user).await?;
        Ok(doc
            .lists
            .get(list)
            .iter()
            .skip(offset)
            .take(count)
            .cloned()
            .collect())
    }

    /// Like [`ListMembershipEngine::list`], with names, descriptions and
    /// preview URLs. Content items that no longer exist are skipped.
    pub async fn list_extended(
        &self,
        user: &UserId,
        list: ListName,
        offset: usize,
        count: Option<usize>,
        locale: Locale,
    ) -> Result<Vec<ListEntry>> {
        let ids = self.list(user, list, offset, count).await?;
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(item) = self.content.try_find_by_id(id.as_str()).await? else {
                debug!("Skipping missing content {} in list {} of {}", id, list, user);
                continue;
            };
            entries.push(ListEntry {
                name: item.display_name(locale).to_string(),
                description: item.description(locale).to_string(),
                preview: self
                    .urls
                    .preview(PreviewKind::Content, item.preview.as_deref()),
                id,
            });
        }
        Ok(entries)
    }

    fn page_size(&self, count: Option<usize>) -> Result<usize> {
        match count {
            None => Ok(self.default_page_size),
            Some(0) => Err(Error::InvalidPagination(
                "count must be at least 1".to_string(),
            )),
            Some(n) => Ok(n),
        }
    }

    pub(crate) async fn load_user(&self, user: &UserId) -> Result<User> {
        self.users
            .find_by_id(user.as_str())
            .await?
            .ok_or_else(|| User::not_found(user.as_str()))
    }

    async fn current_list(&self, key: &str) -> Result<Option<ListName>> {
        let Some(value) = self.index.get(key).await? else {
            return Ok(None);
        };
        ListName::from_str(&value)
            .map(Some)
            .map_err(|_| Error::Inconsistency {
                key: key.to_string(),
                detail: format!("index record holds unknown list {value:?}"),
            })
    }

    /// Read-modify-write the user's list arrays under the user lock. The
    /// index has already been written when this runs, so a failure here
    /// leaves the two stores disagreeing.
    async fn update_lists(
        &self,
        user: &UserId,
        key: &str,
        change: impl FnOnce(&mut UserLists) -> Result<()>,
    ) -> Result<()> {
        let _user = self.user_locks.lock(user.clone()).await;
        let mut doc = self.load_user(user).await.inspect_err(|e| {
            warn!("Index record {} written but user document unreadable: {}", key, e);
        })?;
        change(&mut doc.lists)?;
        self.users.save(&doc).await.map_err(|e| {
            warn!(
                "Index record {} is ahead of the user document (save failed: {})",
                key, e
            );
            Error::from(e)
        })?;
        Ok(())
    }

    /// Rewrite a user's arrays wholesale. Used by reconciliation.
    pub(crate) async fn replace_lists(&self, user: &UserId, lists: UserLists) -> Result<()> {
        let mut doc = self.load_user(user).await?;
        doc.lists = lists;
        self.users.save(&doc).await?;
        info!("Rewrote list arrays of {}", user);
        Ok(())
    }
}
