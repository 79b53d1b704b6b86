//! Shared (L2) cache capability.

use crate::domain::value::{BackendKind, CacheValue};
use crate::error::CacheResult;
use async_trait::async_trait;

/// Network-backed cache shared across processes.
///
/// Every call may suspend on network I/O. Implementations never open, close
/// or retry the underlying connection: they receive a live client at
/// construction and report its failures as [`crate::error::CacheError::Unavailable`].
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisBackedStore`] - text-encoded values, native atomic counters
/// - [`crate::infrastructure::cache::MemcachedBackedStore`] - flag-tagged values, counters with initialize-on-miss
/// - [`crate::infrastructure::cache::SharedBackend`] - whichever of the two was selected at startup
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SharedCacheStore: Send + Sync {
    /// The backend serving this store.
    fn backend(&self) -> BackendKind;

    /// Reads a value.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` on hit
    /// - `Ok(None)` when the key is absent
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CacheError::Corruption`] when the stored data
    /// cannot be decoded. This is never reported as a miss.
    async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>>;

    /// Writes a value.
    ///
    /// `ttl_seconds` of `None` or `Some(0)` stores the value without expiry.
    async fn set(&self, key: &str, value: &CacheValue, ttl_seconds: Option<u64>)
    -> CacheResult<()>;

    /// Removes a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomically adds `amount` to the counter at `key` and returns the new value.
    ///
    /// An absent counter starts from zero.
    async fn increment(&self, key: &str, amount: i64) -> CacheResult<i64>;

    /// Atomically subtracts `amount` from the counter at `key` and returns the new value.
    async fn decrement(&self, key: &str, amount: i64) -> CacheResult<i64>;
}
