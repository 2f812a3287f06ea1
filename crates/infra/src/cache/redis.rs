//! Redis-backed view cache (optional, `redis` feature).
//!
//! Each view is a plain string key with an expiry; each tag is a Redis set of
//! the view keys carrying it. Tag sets may briefly list keys that already
//! expired, which `DEL` tolerates.
//!
//! Invalidation runs as one server-side script, so a view written while a
//! tag is being dropped is either removed with it or stays fully tracked.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value as JsonValue;

use super::{CacheError, CacheTag, ViewCache};

/// Drops every view listed under `KEYS[1]`, then the tag set itself;
/// returns how many views existed.
static INVALIDATE_TAG: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local removed = 0
        for _, key in ipairs(redis.call('SMEMBERS', KEYS[1])) do
            removed = removed + redis.call('DEL', key)
        end
        redis.call('DEL', KEYS[1])
        return removed
        ",
    )
});

fn backend(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[derive(Debug, Clone)]
pub struct RedisViewCache {
    client: redis::Client,
    namespace: String,
}

impl RedisViewCache {
    pub fn new(redis_url: impl AsRef<str>, namespace: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(backend)?;
        Ok(Self {
            client,
            namespace: namespace.into(),
        })
    }

    fn view_key(&self, key: &str) -> String {
        format!("{}:view:{key}", self.namespace)
    }

    fn tag_key(&self, tag: CacheTag) -> String {
        format!("{}:tag:{tag}", self.namespace)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl ViewCache for RedisViewCache {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.view_key(key)).await.map_err(backend)?;
        raw.map(|s| serde_json::from_str(&s).map_err(CacheError::from))
            .transpose()
    }

    async fn set(
        &self,
        key: &str,
        value: &JsonValue,
        tags: &[CacheTag],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        let view_key = self.view_key(key);
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(&view_key, payload, ttl.as_secs().max(1))
            .ignore();
        for tag in tags {
            pipe.sadd(self.tag_key(*tag), &view_key).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await.map_err(backend)
    }

    async fn invalidate(&self, tag: CacheTag) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        INVALIDATE_TAG
            .key(self.tag_key(tag))
            .invoke_async(&mut conn)
            .await
            .map_err(backend)
    }
}
