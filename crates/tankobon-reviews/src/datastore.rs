//! Embedded review datastore, one redb file per content item.

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tankobon_common::UserId;
use tankobon_store::StoreResult;
use tracing::{debug, error};

// Key: insertion sequence, Value: bincode-encoded ReviewRecord
const REVIEWS: TableDefinition<u64, &[u8]> = TableDefinition::new("reviews");

/// One review of a content item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Position in the store, assigned on insert
    pub id: u64,
    pub reviewer: UserId,
    /// Unix seconds
    pub created: i64,
    pub score: Option<u8>,
}

impl ReviewRecord {
    /// A record stamped with the current time, not yet stored
    pub fn new(reviewer: UserId, score: Option<u8>) -> Self {
        Self {
            id: 0,
            reviewer,
            created: chrono::Utc::now().timestamp(),
            score,
        }
    }
}

/// Open handle on one content item's review file
pub struct ReviewDatastore {
    db: Database,
    path: PathBuf,
}

impl ReviewDatastore {
    /// Open the file, creating it if absent
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(REVIEWS)?;
        }
        write_txn.commit()?;

        debug!("Opened review store {}", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record. The stored copy, with its assigned id, is returned.
    pub fn insert(&self, record: ReviewRecord) -> StoreResult<ReviewRecord> {
        let write_txn = self.db.begin_write()?;
        let stored = {
            let mut table = write_txn.open_table(REVIEWS)?;
            let next = table.last()?.map_or(1, |(k, _)| k.value() + 1);
            let stored = ReviewRecord { id: next, ..record };
            let bytes = bincode::serialize(&stored)?;
            table.insert(next, bytes.as_slice())?;
            stored
        };
        write_txn.commit()?;
        Ok(stored)
    }

    /// First record written by `reviewer`
    pub fn find_by_reviewer(&self, reviewer: &UserId) -> StoreResult<Option<ReviewRecord>> {
        Ok(self
            .scan(usize::MAX)?
            .into_iter()
            .find(|r| &r.reviewer == reviewer))
    }

    /// Up to `limit` records in insertion order
    pub fn list(&self, limit: usize) -> StoreResult<Vec<ReviewRecord>> {
        self.scan(limit)
    }

    /// Delete every record written by `reviewer`. Returns how many were deleted.
    pub fn remove_by_reviewer(&self, reviewer: &UserId) -> StoreResult<usize> {
        let ids: Vec<u64> = self
            .scan(usize::MAX)?
            .into_iter()
            .filter(|r| &r.reviewer == reviewer)
            .map(|r| r.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(REVIEWS)?;
            for id in &ids {
                table.remove(id)?;
            }
        }
        write_txn.commit()?;
        Ok(ids.len())
    }

    pub fn count(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REVIEWS)?;
        Ok(table.len()?)
    }

    fn scan(&self, limit: usize) -> StoreResult<Vec<ReviewRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REVIEWS)?;
        let mut result = Vec::new();

        for entry in table.iter()? {
            if result.len() >= limit {
                break;
            }
            let (key, value) = entry?;
            match bincode::deserialize::<ReviewRecord>(value.value()) {
                Ok(record) => result.push(record),
                Err(e) => {
                    error!(
                        "Skipping undecodable review {} in {}: {}",
                        key.value(),
                        self.path.display(),
                        e
                    );
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, ReviewDatastore) {
        let dir = TempDir::new().unwrap();
        let store = ReviewDatastore::open(dir.path().join("reviews/c1.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let (_dir, store) = open();
        let a = store.insert(ReviewRecord::new(UserId::new("u1"), Some(8))).unwrap();
        let b = store.insert(ReviewRecord::new(UserId::new("u2"), None)).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.count().unwrap(), 2);

        let listed = store.list(10).unwrap();
        assert_eq!(listed, vec![a.clone(), b]);
        assert_eq!(store.list(1).unwrap(), vec![a]);
    }

    #[test]
    fn test_remove_by_reviewer() {
        let (_dir, store) = open();
        let u1 = UserId::new("u1");
        store.insert(ReviewRecord::new(u1.clone(), Some(3))).unwrap();
        store.insert(ReviewRecord::new(UserId::new("u2"), Some(5))).unwrap();

        assert_eq!(store.find_by_reviewer(&u1).unwrap().unwrap().score, Some(3));
        assert_eq!(store.remove_by_reviewer(&u1).unwrap(), 1);
        assert!(store.find_by_reviewer(&u1).unwrap().is_none());
        assert_eq!(store.remove_by_reviewer(&u1).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_ids_continue_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1.redb");
        {
            let store = ReviewDatastore::open(&path).unwrap();
            store.insert(ReviewRecord::new(UserId::new("u1"), None)).unwrap();
        }
        let store = ReviewDatastore::open(&path).unwrap();
        let next = store.insert(ReviewRecord::new(UserId::new("u2"), None)).unwrap();
        assert_eq!(next.id, 2);
    }
}
