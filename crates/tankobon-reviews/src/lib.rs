//! Tankobon Reviews - Per-content review stores
//!
//! Each content item's reviews live in their own embedded datastore, opened
//! on demand and closed again when idle. Submitting a review also feeds the
//! content item's aggregate rating.

pub mod datastore;
pub mod facade;
pub mod service;

pub use datastore::{ReviewDatastore, ReviewRecord};
pub use facade::{ReviewStore, spawn_idle_evictor};
pub use service::{MAX_SCORE, MIN_SCORE, ReviewService};
