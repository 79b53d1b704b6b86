//! Redis-backed shared cache.

use crate::domain::{BackendKind, CacheValue, SharedCacheStore};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::sync::Arc;
use tracing::debug;

/// The subset of Redis commands the store relies on.
///
/// The connection is owned by whoever established it; the store only issues
/// commands through it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RedisConnection: Send + Sync {
    /// `GET key`
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `SET key value` or `SET key value EX ttl` when `ttl_seconds` is given.
    async fn set(&self, key: &str, value: String, ttl_seconds: Option<u64>) -> CacheResult<()>;

    /// `DEL key`, returning the number of keys removed.
    async fn del(&self, key: &str) -> CacheResult<u64>;

    /// `INCRBY key delta`
    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// `DECRBY key delta`
    async fn decr_by(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// `PING`
    async fn ping(&self) -> CacheResult<()>;
}

fn redis_error(e: redis::RedisError) -> CacheError {
    CacheError::unavailable(BackendKind::Redis, e)
}

/// Server error replies to `INCRBY`/`DECRBY` (non-integer value, overflow)
/// mean the counter itself is unusable, not the connection.
fn counter_error(key: &str, e: redis::RedisError) -> CacheError {
    if e.code().is_some() {
        CacheError::counter_state(BackendKind::Redis, key, e.to_string())
    } else {
        redis_error(e)
    }
}

// Calls go through `AsyncCommands::` explicitly: several command names
// collide with `RedisConnection`'s own methods.
#[async_trait]
impl RedisConnection for ConnectionManager {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.clone();
        let value: Option<String> = AsyncCommands::get(&mut conn, key)
            .await
            .map_err(redis_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let mut conn = self.clone();
        let result: redis::RedisResult<()> = match ttl_seconds {
            Some(ttl) => AsyncCommands::set_ex(&mut conn, key, value, ttl).await,
            None => AsyncCommands::set(&mut conn, key, value).await,
        };
        result.map_err(redis_error)
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let mut conn = self.clone();
        let deleted: u64 = AsyncCommands::del(&mut conn, key)
            .await
            .map_err(redis_error)?;
        Ok(deleted)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut conn = self.clone();
        let value: i64 = AsyncCommands::incr(&mut conn, key, delta)
            .await
            .map_err(|e| counter_error(key, e))?;
        Ok(value)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut conn = self.clone();
        let value: i64 = AsyncCommands::decr(&mut conn, key, delta)
            .await
            .map_err(|e| counter_error(key, e))?;
        Ok(value)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.clone();
        let _: () = AsyncCommands::ping(&mut conn).await.map_err(redis_error)?;
        Ok(())
    }
}

/// Shared cache over Redis.
///
/// Values are stored as JSON text. Counters use `INCRBY`/`DECRBY`, which
/// treat a missing key as zero, so increments on cold keys are atomic without
/// any fallback.
///
/// Unlike a fail-open cache, every Redis error reaches the caller.
#[derive(Clone)]
pub struct RedisBackedStore {
    conn: Arc<dyn RedisConnection>,
    key_prefix: String,
}

impl RedisBackedStore {
    /// Wraps an already-connected Redis client.
    pub fn new(conn: Arc<dyn RedisConnection>) -> Self {
        Self {
            conn,
            key_prefix: String::new(),
        }
    }

    /// Namespaces every key with `prefix` (e.g. `"app:"`).
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Checks the connection with a `PING`.
    pub async fn ping(&self) -> CacheResult<()> {
        self.conn.ping().await
    }

    /// Constructs the full Redis key with namespace prefix.
    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl SharedCacheStore for RedisBackedStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        let full_key = self.build_key(key);

        let Some(text) = self.conn.get(&full_key).await? else {
            debug!("Redis MISS: {}", key);
            return Ok(None);
        };

        let value = serde_json::from_str(&text)
            .map_err(|e| CacheError::corruption(BackendKind::Redis, key, e.to_string()))?;

        debug!("Redis HIT: {}", key);
        Ok(Some(value))
    }

    async fn set(
        &self,
        key: &str,
        value: &CacheValue,
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        let text = serde_json::to_string(value).map_err(|source| CacheError::Encoding {
            key: key.to_string(),
            source,
        })?;
        let ttl = ttl_seconds.filter(|&ttl| ttl > 0);

        self.conn.set(&self.build_key(key), text, ttl).await?;

        debug!("Redis SET: {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let deleted = self.conn.del(&self.build_key(key)).await?;
        if deleted > 0 {
            debug!("Redis DEL: {}", key);
        }
        Ok(())
    }

    async fn increment(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.conn.incr_by(&self.build_key(key), amount).await
    }

    async fn decrement(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.conn.decr_by(&self.build_key(key), amount).await
    }
}
