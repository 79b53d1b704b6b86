//! Error types shared by every cache tier.
//!
//! A cache miss is never an error: lookups return `Ok(None)`. Everything in
//! [`CacheError`] is something the caller has to decide about.

use crate::domain::BackendKind;

/// Boxed source error from a backend client, kept as-is for callers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during shared cache operations.
///
/// The local tier has no failure modes, so every variant originates at the
/// shared (L2) boundary.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The stored bytes could not be decoded back into a value.
    #[error("{backend} returned undecodable data for key '{key}': {reason}")]
    Corruption {
        backend: BackendKind,
        key: String,
        reason: String,
    },

    /// The injected client reported a connection-level failure.
    #[error("{backend} backend unavailable: {source}")]
    Unavailable {
        backend: BackendKind,
        #[source]
        source: BoxError,
    },

    /// An atomic counter reply was neither a number nor "not found".
    #[error("{backend} counter '{key}' is in an impossible state: {reply}")]
    CounterState {
        backend: BackendKind,
        key: String,
        reply: String,
    },

    /// The key cannot be expressed in the backend's protocol.
    #[error("{backend} cannot store key '{key}': {reason}")]
    InvalidKey {
        backend: BackendKind,
        key: String,
        reason: String,
    },

    /// A value could not be encoded for the shared tier.
    #[error("Failed to encode value for key '{key}': {source}")]
    Encoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The local tier accepted a write that the shared tier rejected.
    ///
    /// The local copy is now ahead of the shared one. Call
    /// [`crate::application::services::TieredCache::evict_local`] to drop it.
    #[error("Write-through failed for key '{key}', local tier is ahead: {source}")]
    WriteThrough {
        key: String,
        #[source]
        source: Box<CacheError>,
    },
}

impl CacheError {
    /// Wraps a client error as a connection-level failure.
    pub fn unavailable<E>(backend: BackendKind, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Unavailable {
            backend,
            source: source.into(),
        }
    }

    pub fn corruption(
        backend: BackendKind,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Corruption {
            backend,
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn counter_state(
        backend: BackendKind,
        key: impl Into<String>,
        reply: impl Into<String>,
    ) -> Self {
        Self::CounterState {
            backend,
            key: key.into(),
            reply: reply.into(),
        }
    }

    pub fn invalid_key(
        backend: BackendKind,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidKey {
            backend,
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns the backend the error originated from, looking through
    /// write-through wrappers.
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Self::Corruption { backend, .. }
            | Self::Unavailable { backend, .. }
            | Self::CounterState { backend, .. }
            | Self::InvalidKey { backend, .. } => Some(*backend),
            Self::Encoding { .. } => None,
            Self::WriteThrough { source, .. } => source.backend(),
        }
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
