//! Configuration types for Tankobon
//!
//! Every section has defaults, so a partial file (or none at all) still
//! produces a usable configuration.

use crate::error::{Error, Result};
use crate::layout::{PublicUrls, StorageLayout};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for Tankobon
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// On-disk locations
    pub storage: StorageConfig,
    /// Cache lifetimes
    pub cache: CacheConfig,
    /// Chapter archive rules
    pub ingest: IngestConfig,
    /// Public URL construction
    pub public: PublicConfig,
    /// List paging
    pub lists: ListsConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values that would make the services misbehave
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        for (name, secs) in [
            ("cache.resolver_ttl_secs", cache.resolver_ttl_secs),
            ("cache.review_idle_ttl_secs", cache.review_idle_ttl_secs),
            ("cache.viewer_flush_ttl_secs", cache.viewer_flush_ttl_secs),
            ("cache.sweep_interval_secs", cache.sweep_interval_secs),
        ] {
            if secs == 0 {
                return Err(Error::Configuration(format!("{name} must be positive")));
            }
        }
        if self.ingest.allowed_extensions.is_empty() {
            return Err(Error::Configuration(
                "ingest.allowed_extensions must not be empty".to_string(),
            ));
        }
        if self.lists.default_page_size == 0 {
            return Err(Error::Configuration(
                "lists.default_page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.storage.root.clone())
    }

    #[must_use]
    pub fn urls(&self) -> PublicUrls {
        PublicUrls::new(self.public.host.clone())
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding the document store, list index, review
    /// stores, extracted pages and temporary uploads
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
        }
    }
}

/// Cache configuration (all values in seconds)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of resolver cache entries
    pub resolver_ttl_secs: u64,
    /// Idle time after which a per-content review store is closed
    pub review_idle_ttl_secs: u64,
    /// Time a view counter accumulates before it is written back
    pub viewer_flush_ttl_secs: u64,
    /// How often expired entries are swept
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            resolver_ttl_secs: 120,
            review_idle_ttl_secs: 60,
            viewer_flush_ttl_secs: 120,
            sweep_interval_secs: 5,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn resolver_ttl(&self) -> Duration {
        Duration::from_secs(self.resolver_ttl_secs)
    }

    #[must_use]
    pub const fn review_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.review_idle_ttl_secs)
    }

    #[must_use]
    pub const fn viewer_flush_ttl(&self) -> Duration {
        Duration::from_secs(self.viewer_flush_ttl_secs)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Chapter archive configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Page file extensions accepted inside an archive, without the dot
    pub allowed_extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
        }
    }
}

/// Public URL configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicConfig {
    /// Base URL prepended to page and preview paths
    pub host: String,
}

impl Default for PublicConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:3200".to_string(),
        }
    }
}

/// List paging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ListsConfig {
    pub default_page_size: usize,
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
