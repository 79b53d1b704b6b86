//! Domain layer: the value model and the shared-store contract.
//!
//! This module has no dependency on any concrete backend client. The
//! infrastructure layer implements [`store::SharedCacheStore`] for Redis and
//! Memcached; the application layer composes it with the local tier.
//!
//! # Architecture
//!
//! - [`value`] - Payload type and backend identifiers
//! - [`store`] - Shared (L2) cache capability trait

pub mod store;
pub mod value;

pub use store::SharedCacheStore;
pub use value::{BackendKind, CacheValue};

#[cfg(test)]
pub use store::MockSharedCacheStore;
