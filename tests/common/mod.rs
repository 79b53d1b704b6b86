#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tiered_cache::prelude::*;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Stored<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Stored<T> {
    fn new(value: T, ttl_seconds: u64) -> Self {
        let expires_at =
            (ttl_seconds > 0).then(|| Instant::now() + Duration::from_secs(ttl_seconds));
        Self { value, expires_at }
    }

    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| at > Instant::now())
    }
}

/// In-memory stand-in for a Redis server.
///
/// `INCRBY`/`DECRBY` create missing keys from zero, like the real server.
#[derive(Default)]
pub struct FakeRedis {
    data: Mutex<HashMap<String, Stored<String>>>,
    fail: AtomicBool,
    slow_reads: AtomicBool,
    pub commands: AtomicUsize,
}

impl FakeRedis {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every following command fail as if the connection dropped.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Makes `GET` yield after reading, so a concurrent task can run while the
    /// reply is in flight.
    pub fn set_slow_reads(&self, slow: bool) {
        self.slow_reads.store(slow, Ordering::SeqCst);
    }

    /// Writes raw text, bypassing the store's encoding.
    pub fn put_raw(&self, key: &str, text: &str) {
        self.data
            .lock()
            .insert(key.to_string(), Stored::new(text.to_string(), 0));
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        let data = self.data.lock();
        data.get(key).filter(|s| s.is_live()).map(|s| s.value.clone())
    }

    fn check(&self) -> CacheResult<()> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable(
                BackendKind::Redis,
                io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"),
            ));
        }
        Ok(())
    }

    fn add(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.check()?;
        let mut data = self.data.lock();

        let (current, expires_at) = match data.get(key).filter(|s| s.is_live()) {
            Some(stored) => match stored.value.parse::<i64>() {
                Ok(n) => (n, stored.expires_at),
                Err(_) => {
                    return Err(CacheError::counter_state(
                        BackendKind::Redis,
                        key,
                        "ERR value is not an integer or out of range",
                    ));
                }
            },
            None => (0, None),
        };

        let next = current.checked_add(delta).ok_or_else(|| {
            CacheError::counter_state(
                BackendKind::Redis,
                key,
                "ERR increment or decrement would overflow",
            )
        })?;

        data.insert(
            key.to_string(),
            Stored {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }
}

#[async_trait]
impl RedisConnection for FakeRedis {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        let value = self.raw(key);
        if self.slow_reads.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: Option<u64>) -> CacheResult<()> {
        self.check()?;
        self.data
            .lock()
            .insert(key.to_string(), Stored::new(value, ttl_seconds.unwrap_or(0)));
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        self.check()?;
        Ok(self.data.lock().remove(key).map_or(0, |_| 1))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.add(key, delta)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.add(key, -delta)
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }
}

/// In-memory stand-in for a memcached server.
///
/// `incr`/`decr` answer `NOT_FOUND` for missing keys and never go below
/// zero, like the real server.
pub struct FakeMemcached {
    data: Mutex<HashMap<String, Stored<RawItem>>>,
    active: AtomicBool,
}

impl FakeMemcached {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(HashMap::new()),
            active: AtomicBool::new(true),
        })
    }

    pub fn inactive() -> Arc<Self> {
        let fake = Self::new();
        fake.active.store(false, Ordering::SeqCst);
        fake
    }

    pub fn raw(&self, key: &str) -> Option<RawItem> {
        let data = self.data.lock();
        data.get(key).filter(|s| s.is_live()).map(|s| s.value.clone())
    }

    pub fn put_raw(&self, key: &str, item: RawItem) {
        self.data
            .lock()
            .insert(key.to_string(), Stored::new(item, 0));
    }

    fn apply(&self, key: &str, delta: u64, incr: bool) -> CacheResult<CounterReply> {
        let mut data = self.data.lock();

        let Some(stored) = data.get_mut(key).filter(|s| s.is_live()) else {
            return Ok(CounterReply::NotFound);
        };

        let text = String::from_utf8_lossy(&stored.value.data).trim().to_string();
        let Ok(current) = text.parse::<u64>() else {
            return Ok(CounterReply::Unexpected(
                "CLIENT_ERROR cannot increment or decrement non-numeric value".to_string(),
            ));
        };

        let next = if incr {
            current.wrapping_add(delta)
        } else {
            current.saturating_sub(delta)
        };
        stored.value.data = next.to_string().into_bytes();
        Ok(CounterReply::Value(next))
    }
}

#[async_trait]
impl MemcachedConnection for FakeMemcached {
    async fn get(&self, key: &str) -> CacheResult<Option<RawItem>> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, item: RawItem, exptime: u32) -> CacheResult<()> {
        self.data
            .lock()
            .insert(key.to_string(), Stored::new(item, u64::from(exptime)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    // Yielding after the reply lets concurrent callers interleave between
    // `incr` and the store's follow-up `set`, as they would over the network.
    async fn increment(&self, key: &str, delta: u64) -> CacheResult<CounterReply> {
        let reply = self.apply(key, delta, true);
        tokio::task::yield_now().await;
        reply
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<CounterReply> {
        let reply = self.apply(key, delta, false);
        tokio::task::yield_now().await;
        reply
    }

    async fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

pub fn local(capacity: usize, ttl: Option<Duration>) -> BoundedLocalCache<CacheValue> {
    BoundedLocalCache::new(NonZeroUsize::new(capacity).unwrap(), ttl)
}

pub fn redis_store(fake: &Arc<FakeRedis>) -> RedisBackedStore {
    RedisBackedStore::new(fake.clone())
}

pub fn memcached_store(fake: &Arc<FakeMemcached>) -> MemcachedBackedStore {
    MemcachedBackedStore::new(fake.clone())
}

/// Tiered cache whose L2 is selected from the given fakes.
pub async fn tiered(
    capacity: usize,
    ttl: Option<Duration>,
    memcached: Option<&Arc<FakeMemcached>>,
    redis: Option<&Arc<FakeRedis>>,
) -> TieredCache {
    let shared = SharedBackend::select(memcached.map(memcached_store), redis.map(redis_store))
        .await
        .unwrap();
    TieredCache::new(local(capacity, ttl), Arc::new(shared))
}
