//! Tankobon Lists - Per-user reading lists
//!
//! Keeps the list membership index and the list arrays of user documents
//! in agreement, and audits them when they drift apart.

pub mod engine;
pub mod reconcile;

pub use engine::{ListEntry, ListMembershipEngine};
pub use reconcile::{Anomaly, ReconcileReport, Reconciler};
