//! # Tiered Cache
//!
//! A two-tier cache: a bounded, TTL-aware LRU living in process memory (L1)
//! in front of a shared network cache (L2) backed by either Redis or
//! Memcached.
//!
//! ## Architecture
//!
//! - **Domain Layer** ([`domain`]) - Value model and the shared-store trait
//! - **Infrastructure Layer** ([`infrastructure`]) - Local LRU, Redis and Memcached stores
//! - **Application Layer** ([`application`]) - [`TieredCache`] orchestration
//!
//! ## Semantics
//!
//! - Reads go L1 → L2, and an L2 hit is copied back into L1
//! - Writes go to L1 and then through to L2; an L2 failure is reported as
//!   [`CacheError::WriteThrough`] with L1 left ahead
//! - Exactly one L2 backend is chosen at startup ([`SharedBackend::select`])
//!   and never changes
//! - Atomic counters live only in L2 and are reached through
//!   [`TieredCache::shared`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use tiered_cache::prelude::*;
//!
//! # async fn run(redis: redis::aio::ConnectionManager) -> Result<(), CacheError> {
//! let store = RedisBackedStore::new(Arc::new(redis));
//! let shared = SharedBackend::select(None, Some(store)).await?;
//! let local = BoundedLocalCache::new(NonZeroUsize::new(1024).unwrap(), None);
//! let cache = TieredCache::new(local, Arc::new(shared));
//!
//! cache.set("user:1", serde_json::json!({ "name": "Ada" }), Some(300)).await?;
//! let hits = cache.shared().increment("hits", 1).await?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! The bundled CLI reads its settings from environment variables via
//! [`config::Config`].

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod telemetry;

pub use application::services::TieredCache;
pub use error::{CacheError, CacheResult};
pub use infrastructure::cache::SharedBackend;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::application::services::TieredCache;
    pub use crate::domain::{BackendKind, CacheValue, SharedCacheStore};
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::infrastructure::cache::{
        BoundedLocalCache, CounterReply, MemcachedBackedStore, MemcachedConnection, RawItem,
        RedisBackedStore, RedisConnection, SharedBackend,
    };
}
