//! Tankobon Cache - in-process caches in front of the stores
//!
//! This crate provides a TTL cache with expiry notification, the resolver
//! cache used for bounded-staleness reads of catalog documents, and the view
//! counter aggregator.

pub mod resolver;
pub mod ttl;
pub mod viewers;

pub use resolver::{CacheStats, Resolver};
pub use ttl::{ExpiryListener, TtlCache, spawn_sweeper};
pub use viewers::{ViewCounter, spawn_flusher};
