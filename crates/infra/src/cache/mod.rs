//! Tag-indexed cache for derived views.
//!
//! A cached view is stored under its key together with the tags it depends
//! on. Invalidating a tag drops every entry carrying it; the next read of an
//! affected view recomputes from the store.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use in_memory::InMemoryViewCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisViewCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invalidation label shared by one or more views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheTag {
    Items,
    Stats,
    Months,
    Warehouses,
}

impl CacheTag {
    pub const ALL: [CacheTag; 4] = [
        CacheTag::Items,
        CacheTag::Stats,
        CacheTag::Months,
        CacheTag::Warehouses,
    ];

    /// Tags touched by any item or transaction write.
    pub const LEDGER: [CacheTag; 3] = [CacheTag::Items, CacheTag::Stats, CacheTag::Months];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheTag::Items => "items",
            CacheTag::Stats => "stats",
            CacheTag::Months => "months",
            CacheTag::Warehouses => "warehouses",
        }
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s.trim())
            .ok_or_else(|| format!("unknown cache tag '{s}'"))
    }
}

/// The fixed set of cached aggregate views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Items,
    Stats,
    Months,
    Warehouses,
}

impl View {
    pub fn key(self) -> &'static str {
        match self {
            View::Items => "items",
            View::Stats => "stats",
            View::Months => "months",
            View::Warehouses => "warehouse-stats",
        }
    }

    pub fn tags(self) -> &'static [CacheTag] {
        match self {
            View::Items => &[CacheTag::Items],
            View::Stats => &[CacheTag::Stats],
            View::Months => &[CacheTag::Items, CacheTag::Months],
            View::Warehouses => &[CacheTag::Warehouses],
        }
    }
}

/// Cache backend for derived views.
#[async_trait]
pub trait ViewCache: Send + Sync {
    /// Cached value, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, CacheError>;

    async fn set(
        &self,
        key: &str,
        value: &JsonValue,
        tags: &[CacheTag],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Drop every entry carrying `tag`. Returns how many entries went away.
    async fn invalidate(&self, tag: CacheTag) -> Result<usize, CacheError>;
}
