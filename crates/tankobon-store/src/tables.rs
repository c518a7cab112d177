//! Redb table definitions for persistent storage.

use redb::TableDefinition;

// Catalog documents, bincode-encoded, keyed by document id
pub const CONTENT: TableDefinition<&str, &[u8]> = TableDefinition::new("content");
pub const VOLUMES: TableDefinition<&str, &[u8]> = TableDefinition::new("volumes");
pub const TEAMS: TableDefinition<&str, &[u8]> = TableDefinition::new("teams");
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
pub const CHARACTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("characters");
pub const NEWS: TableDefinition<&str, &[u8]> = TableDefinition::new("news");

// List membership
// Key: "<userId>_<contentId>", Value: list name
pub const LIST_INDEX: TableDefinition<&str, &str> = TableDefinition::new("list_index");
