//! Tankobon Store - persistence for the catalog
//!
//! This crate provides the primary document store (catalog entities) and the
//! sorted key-value index used for list membership lookups. Both are backed
//! by redb.

pub mod document;
pub mod error;
pub mod index;
pub mod redb_store;
pub mod tables;

// Re-exports
pub use document::{Collection, Document, DocumentStore, Filter};
pub use error::{StoreError, StoreResult};
pub use index::{IndexStore, RedbIndexStore, membership_key, user_prefix};
pub use redb_store::RedbDocumentStore;
