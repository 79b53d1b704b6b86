//! Startup-time choice of the authoritative shared cache.

use super::memcached_store::MemcachedBackedStore;
use super::redis_store::RedisBackedStore;
use crate::domain::{BackendKind, CacheValue, SharedCacheStore};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use tracing::{info, warn};

/// Exactly one shared cache, fixed for the lifetime of the value.
///
/// There is no failover: once selected, every call goes to the same backend
/// and its errors are reported as-is.
#[derive(Clone)]
pub enum SharedBackend {
    Redis(RedisBackedStore),
    Memcached(MemcachedBackedStore),
}

impl SharedBackend {
    /// Picks the backend to use.
    ///
    /// Memcached wins when its connection is active; otherwise Redis is used.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] when Redis is not provided and
    /// Memcached is either missing or inactive.
    pub async fn select(
        memcached: Option<MemcachedBackedStore>,
        redis: Option<RedisBackedStore>,
    ) -> CacheResult<Self> {
        let mut last_tried = BackendKind::Redis;

        if let Some(store) = memcached {
            if store.is_active().await {
                info!("Shared cache backend: memcached");
                return Ok(Self::Memcached(store));
            }
            warn!("Memcached connection inactive, falling back to Redis");
            last_tried = BackendKind::Memcached;
        }

        match redis {
            Some(store) => {
                info!("Shared cache backend: redis");
                Ok(Self::Redis(store))
            }
            None => Err(CacheError::unavailable(
                last_tried,
                "no usable shared cache backend configured",
            )),
        }
    }

    fn store(&self) -> &dyn SharedCacheStore {
        match self {
            Self::Redis(store) => store,
            Self::Memcached(store) => store,
        }
    }
}

#[async_trait]
impl SharedCacheStore for SharedBackend {
    fn backend(&self) -> BackendKind {
        self.store().backend()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        self.store().get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &CacheValue,
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        self.store().set(key, value, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.store().delete(key).await
    }

    async fn increment(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.store().increment(key, amount).await
    }

    async fn decrement(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.store().decrement(key, amount).await
    }
}
