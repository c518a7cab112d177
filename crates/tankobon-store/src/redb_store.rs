//! Persistent document store backed by redb.
//!
//! Each collection is one table of bincode-encoded documents keyed by id.
//! All writes are synchronous (write txn + commit).

use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata};
use std::path::Path;
use tracing::{debug, error};

use crate::document::{Collection, Document, DocumentStore, Filter};
use crate::error::{StoreError, StoreResult};

/// Persistent document store backed by redb.
pub struct RedbDocumentStore {
    db: Database,
}

impl RedbDocumentStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        for collection in Collection::ALL {
            let _t = write_txn.open_table(collection.table())?;
        }
        write_txn.commit()?;

        debug!("Opened document store at {}", path.display());
        Ok(Self { db })
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: Collection) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(collection.table())?;
        Ok(table.len()?)
    }

    // ---- Generic helpers ----

    fn get_document<T: Document>(&self, id: &str) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::COLLECTION.table())?;
        match table.get(id)? {
            Some(val) => Ok(Some(bincode::deserialize(val.value())?)),
            None => Ok(None),
        }
    }

    fn scan_documents<T: Document>(
        &self,
        filter: Filter<'_, T>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::COLLECTION.table())?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let key = entry.0.value();
            let doc: T = match bincode::deserialize(entry.1.value()) {
                Ok(doc) => doc,
                Err(e) => {
                    error!(
                        "Failed to decode {} document '{}': {}",
                        T::COLLECTION.name(),
                        key,
                        e
                    );
                    continue;
                }
            };
            if filter(&doc) {
                result.push(doc);
                if limit.is_some_and(|n| result.len() >= n) {
                    break;
                }
            }
        }
        Ok(result)
    }

    fn put_document<T: Document>(&self, doc: &T, create_only: bool) -> StoreResult<()> {
        let bytes = bincode::serialize(doc)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(T::COLLECTION.table())?;
            if create_only && table.get(doc.key())?.is_some() {
                return Err(StoreError::AlreadyExists {
                    collection: T::COLLECTION.name(),
                    id: doc.key().to_string(),
                });
            }
            table.insert(doc.key(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_document(&self, collection: Collection, id: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(collection.table())?;
            table.remove(id)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }
}

#[async_trait]
impl<T: Document> DocumentStore<T> for RedbDocumentStore {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<T>> {
        self.get_document(id)
    }

    async fn find_one(&self, filter: Filter<'_, T>) -> StoreResult<Option<T>> {
        Ok(self.scan_documents(filter, Some(1))?.into_iter().next())
    }

    async fn find_all(&self, filter: Filter<'_, T>) -> StoreResult<Vec<T>> {
        self.scan_documents(filter, None)
    }

    async fn insert(&self, doc: &T) -> StoreResult<()> {
        self.put_document(doc, true)
    }

    async fn save(&self, doc: &T) -> StoreResult<()> {
        self.put_document(doc, false)
    }

    async fn remove(&self, id: &str) -> StoreResult<bool> {
        self.delete_document(T::COLLECTION, id)
    }
}
