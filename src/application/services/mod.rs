//! Services built on top of the cache tiers.

pub mod tiered_cache;

pub use tiered_cache::TieredCache;
