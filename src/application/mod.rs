//! Application layer: composes the cache tiers into the caller-facing API.
//!
//! # Available Services
//!
//! - [`services::tiered_cache::TieredCache`] - Read-through / write-through two-tier cache

pub mod services;
