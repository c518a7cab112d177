//! Tankobon Ingest - chapter archives in, ordered volumes out
//!
//! This crate validates uploaded chapter archives, extracts their pages into
//! the storage layout and records the chapter in its volume. It also serves
//! the read side of the chapter catalog.

pub mod archive;
pub mod processor;
pub mod reader;

pub use archive::{ArchivePolicy, ValidatedArchive, inspect};
pub use processor::{ChapterUpload, IngestOutcome, IngestProcessor};
pub use reader::{ChapterReader, ChapterSummary, ChapterView, TeamSummary, VolumeSummary};
