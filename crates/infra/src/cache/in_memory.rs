use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{CacheError, CacheTag, ViewCache};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: JsonValue,
    tags: Vec<CacheTag>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local view cache.
#[derive(Debug, Clone, Default)]
pub struct InMemoryViewCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Backend("lock poisoned".to_string())
}

#[async_trait]
impl ViewCache for InMemoryViewCache {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, CacheError> {
        {
            let entries = self.entries.read().map_err(poisoned)?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries.get(key).is_some_and(CacheEntry::is_expired) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: &JsonValue,
        tags: &[CacheTag],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                tags: tags.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, tag: CacheTag) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.contains(&tag));
        Ok(before - entries.len())
    }
}
