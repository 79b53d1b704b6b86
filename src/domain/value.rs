//! Cache payload and backend identifiers.

use std::fmt;

/// Opaque payload stored in every tier.
///
/// The cache only looks inside it when a backend has to pick an on-wire
/// representation.
pub type CacheValue = serde_json::Value;

/// Which shared cache implementation is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Redis,
    Memcached,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memcached => "memcached",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
