//! Cache tiers.
//!
//! - [`BoundedLocalCache`] - In-process LRU (L1)
//! - [`RedisBackedStore`] - Redis shared cache (L2)
//! - [`MemcachedBackedStore`] - Memcached shared cache (L2)
//! - [`SharedBackend`] - The L2 store selected at startup
//!
//! Both L2 stores take an injected, already-connected client behind a small
//! trait ([`RedisConnection`], [`MemcachedConnection`]); establishing and
//! tearing down connections is the caller's job.

mod backend;
mod local_cache;
mod memcache_client;
mod memcached_store;
mod redis_store;

pub use backend::SharedBackend;
pub use local_cache::BoundedLocalCache;
pub use memcache_client::MemcacheConnection;
pub use memcached_store::{
    CounterReply, MemcachedBackedStore, MemcachedConnection, RawItem, flags,
};
pub use redis_store::{RedisBackedStore, RedisConnection};
