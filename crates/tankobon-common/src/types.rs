//! Core type definitions for Tankobon
//!
//! This module defines identifiers and the small closed enumerations used
//! throughout the catalog: chapter numbers, genres, locales and list names.

use crate::error::Error;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a new random identifier
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            /// Get the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a content item (one serialized work)
    ContentId
);
string_id!(
    /// Identifier of a translator team
    TeamId
);
string_id!(
    /// Identifier of a user account
    UserId
);
string_id!(
    /// Identifier of a volume document
    VolumeId
);
string_id!(
    /// Identifier of a character
    CharacterId
);
string_id!(
    /// Identifier of a news post
    NewsId
);

/// Chapter number within a volume.
///
/// Chapters may be fractional (`12.5` for an extra), so this wraps an `f64`
/// restricted to finite, non-negative values and gives it a total order.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ChapterNumber(f64);

impl ChapterNumber {
    /// Create a chapter number, rejecting NaN, infinities and negatives
    pub fn new(value: f64) -> Result<Self, Error> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidChapterNumber(value.to_string()));
        }
        // Collapse -0.0 so Eq and Hash agree with the numeric value
        Ok(Self(if value == 0.0 { 0.0 } else { value }))
    }

    /// Get the numeric value
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for ChapterNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ChapterNumber {}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for ChapterNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Debug for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChapterNumber({})", self.0)
    }
}

// f64's Display already prints `2` for 2.0 and `2.5` for 2.5, which is the
// form used in page directories and URLs.
impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f64> for ChapterNumber {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChapterNumber> for f64 {
    fn from(number: ChapterNumber) -> Self {
        number.0
    }
}

impl From<u32> for ChapterNumber {
    fn from(value: u32) -> Self {
        Self(f64::from(value))
    }
}

impl FromStr for ChapterNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidChapterNumber(s.to_string()))?;
        Self::new(value)
    }
}

/// Publication state of a content item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentState {
    #[default]
    Ongoing,
    Released,
}

/// Catalog genre. The numeric codes are stable and used by external callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Genre {
    Action,
    Adventure,
    Comedy,
    Drama,
    Fantasy,
    Horror,
    Mystery,
    Romance,
    SciFi,
    SliceOfLife,
    Sports,
    Supernatural,
}

impl Genre {
    pub const ALL: [Self; 12] = [
        Self::Action,
        Self::Adventure,
        Self::Comedy,
        Self::Drama,
        Self::Fantasy,
        Self::Horror,
        Self::Mystery,
        Self::Romance,
        Self::SciFi,
        Self::SliceOfLife,
        Self::Sports,
        Self::Supernatural,
    ];

    /// Numeric code of the genre
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up a genre by its numeric code
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Parse a list of genre codes into a set.
    ///
    /// Unknown codes and duplicates are both rejected.
    pub fn parse_set(codes: &[u8]) -> Result<BTreeSet<Self>, Error> {
        let mut set = BTreeSet::new();
        for &code in codes {
            let genre = Self::from_code(code)
                .ok_or_else(|| Error::InvalidGenres(format!("unknown genre code {code}")))?;
            if !set.insert(genre) {
                return Err(Error::InvalidGenres(format!("duplicate genre code {code}")));
            }
        }
        Ok(set)
    }
}

/// Supported display locales
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ru,
}

impl Locale {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::En),
            "ru" => Ok(Self::Ru),
            other => Err(Error::invalid_argument(format!(
                "locale is not supported: {other}"
            ))),
        }
    }
}

/// Named per-user list bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListName {
    Reading,
    Abandoned,
    Planned,
}

impl ListName {
    pub const ALL: [Self; 3] = [Self::Reading, Self::Abandoned, Self::Planned];

    /// Canonical name, also the value stored in the list index
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Abandoned => "abandoned",
            Self::Planned => "planned",
        }
    }
}

impl fmt::Display for ListName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reading" | "readed" => Ok(Self::Reading),
            "abandoned" => Ok(Self::Abandoned),
            "planned" | "planning" | "planing" => Ok(Self::Planned),
            other => Err(Error::InvalidListName(other.to_string())),
        }
    }
}

/// Account role, supplied by the session layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Administrator,
    Creator,
}

impl Role {
    /// Whether the role may publish chapters
    #[must_use]
    pub const fn can_publish(self) -> bool {
        !matches!(self, Self::User)
    }
}
