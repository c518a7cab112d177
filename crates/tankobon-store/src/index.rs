//! Sorted key-value index used for list membership.
//!
//! Keys are `"<userId>_<contentId>"` and values are list names. Prefix scans
//! over `"<userId>_"` enumerate one user's entries, which assumes user ids
//! never contain an underscore.

use async_trait::async_trait;
use redb::{Database, ReadableTable};
use std::path::Path;
use tankobon_common::{ContentId, Error, UserId};
use tracing::debug;

use crate::error::StoreResult;
use crate::tables::LIST_INDEX;

/// Build the index key for a (user, content) pair
#[must_use]
pub fn membership_key(user: &UserId, content: &ContentId) -> String {
    format!("{user}_{content}")
}

/// Prefix shared by every index key of one user
#[must_use]
pub fn user_prefix(user: &UserId) -> String {
    format!("{user}_")
}

/// Fast lookup store mapping (user, content) keys to list names
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete a key. Returns false if it was absent.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All entries whose key starts with `prefix`, in key order
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>>;

    async fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Value of a key that must exist
    async fn require(&self, key: &str) -> tankobon_common::Result<String> {
        self.get(key)
            .await?
            .ok_or_else(|| Error::IndexKeyNotFound(key.to_string()))
    }
}

/// Index store backed by its own redb file
pub struct RedbIndexStore {
    db: Database,
}

impl RedbIndexStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(LIST_INDEX)?;
        }
        write_txn.commit()?;

        debug!("Opened list index at {}", path.display());
        Ok(Self { db })
    }

    /// Every entry in key order
    pub fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LIST_INDEX)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            result.push((entry.0.value().to_string(), entry.1.value().to_string()));
        }
        Ok(result)
    }
}

#[async_trait]
impl IndexStore for RedbIndexStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LIST_INDEX)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LIST_INDEX)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(LIST_INDEX)?;
            table.remove(key)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LIST_INDEX)?;
        let mut result = Vec::new();
        for entry in table.range(prefix..)? {
            let entry = entry?;
            let key = entry.0.value();
            if !key.starts_with(prefix) {
                break;
            }
            result.push((key.to_string(), entry.1.value().to_string()));
        }
        Ok(result)
    }
}
