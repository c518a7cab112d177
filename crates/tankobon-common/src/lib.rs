//! Tankobon Common - Shared types and utilities
//!
//! This crate provides the catalog entities, identifiers, error taxonomy,
//! configuration and on-disk layout used across all Tankobon components.

pub mod catalog;
pub mod config;
pub mod error;
pub mod layout;
pub mod locks;
pub mod types;

pub use catalog::*;
pub use config::Config;
pub use error::{Error, ErrorCategory, Result};
pub use layout::{PreviewKind, PublicUrls, StorageLayout};
pub use locks::KeyedLocks;
pub use types::*;
