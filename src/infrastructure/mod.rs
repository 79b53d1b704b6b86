//! Infrastructure layer: concrete cache tiers and backend clients.
//!
//! # Modules
//!
//! - [`cache`] - Local LRU, Redis and Memcached stores, backend selection

pub mod cache;
