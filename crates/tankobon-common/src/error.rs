//! Error types for Tankobon
//!
//! This module defines the common error taxonomy used throughout the system:
//! validation, not-found, conflict, storage and inconsistency errors.

use thiserror::Error;

/// Common result type for Tankobon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Tankobon
#[derive(Debug, Error)]
pub enum Error {
    // Validation errors
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("invalid genres: {0}")]
    InvalidGenres(String),

    #[error("invalid chapter number: {0}")]
    InvalidChapterNumber(String),

    #[error("invalid list name: {0}")]
    InvalidListName(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("invalid identifier: {0:?}")]
    InvalidId(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Not found errors
    #[error("content not found: {0}")]
    ContentNotFound(String),

    #[error("team not found: {0}")]
    TeamNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("{collection} not found: {id}")]
    DocumentNotFound { collection: &'static str, id: String },

    #[error("volume not found: content {content}, team {team}, volume {number}")]
    VolumeNotFound {
        content: String,
        team: String,
        number: u32,
    },

    #[error("chapter not found: volume {volume}, chapter {chapter}")]
    ChapterNotFound { volume: u32, chapter: String },

    #[error("index key not found: {0}")]
    IndexKeyNotFound(String),

    #[error("{content} is not in list {list}")]
    NotInList { content: String, list: String },

    #[error("no review by {user} for {content}")]
    ReviewNotFound { content: String, user: String },

    // Conflict errors
    #[error("chapter {chapter} already exists in volume {volume}")]
    ChapterAlreadyExists { volume: u32, chapter: String },

    #[error("{content} is already in list {list}")]
    AlreadyInList { content: String, list: String },

    #[error("{user} already reviewed {content}")]
    AlreadyReviewed { content: String, user: String },

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("disk I/O error: {0}")]
    DiskIo(#[from] std::io::Error),

    // Cross-store consistency
    #[error("inconsistent list membership for {key}: {detail}")]
    Inconsistency { key: String, detail: String },

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input violates an allowed format; the caller must resubmit
    Validation,
    /// A referenced entity is absent
    NotFound,
    /// The request collides with existing state
    Conflict,
    /// A backing store failed
    Storage,
    /// Two stores disagree about list membership
    Inconsistency,
    Internal,
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid archive error
    pub fn invalid_archive(msg: impl Into<String>) -> Self {
        Self::InvalidArchive(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArchive(_)
            | Self::InvalidGenres(_)
            | Self::InvalidChapterNumber(_)
            | Self::InvalidListName(_)
            | Self::InvalidPagination(_)
            | Self::InvalidId(_)
            | Self::InvalidArgument(_) => ErrorCategory::Validation,

            Self::ContentNotFound(_)
            | Self::TeamNotFound(_)
            | Self::UserNotFound(_)
            | Self::DocumentNotFound { .. }
            | Self::VolumeNotFound { .. }
            | Self::ChapterNotFound { .. }
            | Self::IndexKeyNotFound(_)
            | Self::NotInList { .. }
            | Self::ReviewNotFound { .. } => ErrorCategory::NotFound,

            Self::ChapterAlreadyExists { .. }
            | Self::AlreadyInList { .. }
            | Self::AlreadyReviewed { .. } => ErrorCategory::Conflict,

            Self::Storage(_) | Self::DiskIo(_) => ErrorCategory::Storage,

            Self::Inconsistency { .. } => ErrorCategory::Inconsistency,

            Self::Configuration(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.category(), ErrorCategory::NotFound)
    }

    /// Check if this is a retryable error.
    ///
    /// Nothing is: a failed write may already be partially applied, so
    /// retrying is left to callers that know the operation is safe to repeat.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }

    /// Get the HTTP status code the request layer should answer with
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Storage | ErrorCategory::Inconsistency | ErrorCategory::Internal => {
                500
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::invalid_archive("folder present").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            Error::ChapterAlreadyExists {
                volume: 1,
                chapter: "2".into()
            }
            .category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            Error::Inconsistency {
                key: "u1_c1".into(),
                detail: "x".into()
            }
            .category(),
            ErrorCategory::Inconsistency
        );
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::TeamNotFound("t1".into()).is_not_found());
        assert!(Error::IndexKeyNotFound("u1_c1".into()).is_not_found());
        assert!(!Error::storage("boom").is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::invalid_archive("x").http_status_code(), 400);
        assert_eq!(Error::ContentNotFound("c".into()).http_status_code(), 404);
        assert_eq!(
            Error::AlreadyInList {
                content: "c".into(),
                list: "reading".into()
            }
            .http_status_code(),
            409
        );
        assert_eq!(Error::storage("x").http_status_code(), 500);
        assert!(!Error::storage("x").is_retryable());
    }
}
