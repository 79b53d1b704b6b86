//! Read-through / write-through cache over a local and a shared tier.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{BackendKind, CacheValue, SharedCacheStore};
use crate::error::{CacheError, CacheResult};
use crate::infrastructure::cache::{BoundedLocalCache, SharedBackend};
use metrics::counter;
use tracing::{debug, warn};

/// Two-tier cache: a bounded in-process LRU (L1) in front of one shared
/// store (L2).
///
/// # Reads
///
/// L1 is consulted first. On a miss (including an entry that just expired)
/// L2 is queried, and a hit there is copied into L1 under L1's default TTL.
/// The copy is skipped if a `set` or `delete` reached L1 while L2 was being
/// read, so a slow reader never replaces a newer write or revives a deleted
/// key.
///
/// # Writes
///
/// `set` writes L1 and then L2. If L2 fails the call fails with
/// [`CacheError::WriteThrough`], but the L1 write is not undone: until the
/// caller reacts (for example with [`Self::evict_local`]) L1 serves a value L2
/// does not have. Concurrent writers to one key are last-write-wins per tier,
/// so the tiers can briefly disagree.
///
/// # Counters
///
/// Counters are not proxied. L1 cannot safely hold a value that L2 mutates
/// atomically, so use [`Self::shared`] to reach `increment`/`decrement`.
pub struct TieredCache<S: SharedCacheStore = SharedBackend> {
    local: BoundedLocalCache<CacheValue>,
    shared: Arc<S>,
}

impl<S: SharedCacheStore> TieredCache<S> {
    /// Creates a tiered cache over an already-selected shared store.
    pub fn new(local: BoundedLocalCache<CacheValue>, shared: Arc<S>) -> Self {
        Self { local, shared }
    }

    /// The backend serving L2.
    pub fn backend(&self) -> BackendKind {
        self.shared.backend()
    }

    /// Direct access to the shared store, for atomic counters.
    pub fn shared(&self) -> &Arc<S> {
        &self.shared
    }

    /// Number of entries resident in L1.
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Whether `key` is currently served from L1.
    pub fn is_cached_locally(&self, key: &str) -> bool {
        self.local.contains(key)
    }

    /// Retrieves a value, hydrating L1 from L2 on an L1 miss.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` when either tier has the key
    /// - `Ok(None)` when neither does
    ///
    /// # Errors
    ///
    /// L2 errors are returned unchanged. L1 is not touched when L2 fails.
    pub async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        if let Some(value) = self.local.get(key) {
            counter!("tiered_cache_l1_hits_total").increment(1);
            debug!("L1 HIT: {}", key);
            return Ok(Some(value));
        }

        let epoch = self.local.write_epoch();

        match self.shared.get(key).await? {
            Some(value) => {
                counter!("tiered_cache_l2_hits_total").increment(1);
                // a set or delete that landed during the L2 round trip wins
                if self.local.set_if_unchanged(key, value.clone(), None, epoch) {
                    debug!("L2 HIT: {} (hydrated L1)", key);
                } else {
                    debug!("L2 HIT: {} (L1 changed meanwhile, not hydrated)", key);
                }
                Ok(Some(value))
            }
            None => {
                counter!("tiered_cache_misses_total").increment(1);
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    /// Stores a value in L1 and then in L2.
    ///
    /// `ttl_seconds` applies to both tiers; `Some(0)` stores without expiry
    /// and `None` uses L1's default TTL locally and no expiry in L2.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::WriteThrough`] wrapping the L2 error when L2
    /// rejects the write. L1 keeps the new value.
    pub async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        self.local
            .set(key, value.clone(), ttl_seconds.map(Duration::from_secs));

        if let Err(source) = self.shared.set(key, &value, ttl_seconds).await {
            counter!("tiered_cache_write_through_failures_total").increment(1);
            warn!("Write-through to {} failed for {}: {}", self.backend(), key, source);
            return Err(CacheError::WriteThrough {
                key: key.to_string(),
                source: Box::new(source),
            });
        }

        debug!("Cache SET: {} (TTL: {:?})", key, ttl_seconds);
        Ok(())
    }

    /// Removes a key from L1 and then from L2.
    ///
    /// Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// L2 errors are returned unchanged; the L1 removal has already happened.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.local.delete(key);
        self.shared.delete(key).await?;
        debug!("Cache DELETE: {}", key);
        Ok(())
    }

    /// Drops the L1 copy of `key` without touching L2.
    ///
    /// Intended for callers handling [`CacheError::WriteThrough`].
    pub fn evict_local(&self, key: &str) {
        self.local.delete(key);
    }
}
