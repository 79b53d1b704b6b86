//! [`MemcachedConnection`] over the blocking `memcache` client.

use super::memcached_store::{CounterReply, MemcachedConnection, RawItem};
use crate::domain::BackendKind;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use memcache::{CommandError, MemcacheError, ToMemcacheValue};
use std::io::Write;
use std::sync::Arc;

impl<W: Write> ToMemcacheValue<W> for RawItem {
    fn get_flags(&self) -> u32 {
        self.flags
    }

    fn get_length(&self) -> usize {
        self.data.len()
    }

    fn write_to(&self, stream: &mut W) -> std::io::Result<()> {
        stream.write_all(&self.data)
    }
}

/// Memcached connection backed by a pooled `memcache::Client`.
///
/// The client speaks blocking I/O, so every command runs on the blocking
/// thread pool and never stalls the async executor.
#[derive(Clone)]
pub struct MemcacheConnection {
    client: Arc<memcache::Client>,
}

impl MemcacheConnection {
    /// Wraps an already-connected client.
    pub fn new(client: memcache::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    async fn run<T, F>(&self, op: F) -> CacheResult<Result<T, MemcacheError>>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client) -> Result<T, MemcacheError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || op(client.as_ref()))
            .await
            .map_err(|e| CacheError::unavailable(BackendKind::Memcached, e))
    }

    async fn counter<F>(&self, op: F) -> CacheResult<CounterReply>
    where
        F: FnOnce(&memcache::Client) -> Result<u64, MemcacheError> + Send + 'static,
    {
        counter_reply(self.run(op).await?)
    }
}

/// Sorts an `incr`/`decr` result into the three counter outcomes.
///
/// Protocol-level answers other than `NOT_FOUND` are reported as
/// [`CounterReply::Unexpected`]; transport and pool failures are errors.
fn counter_reply(result: Result<u64, MemcacheError>) -> CacheResult<CounterReply> {
    match result {
        Ok(value) => Ok(CounterReply::Value(value)),
        Err(MemcacheError::CommandError(CommandError::KeyNotFound)) => Ok(CounterReply::NotFound),
        Err(
            err @ (MemcacheError::CommandError(_)
            | MemcacheError::ClientError(_)
            | MemcacheError::ServerError(_)),
        ) => Ok(CounterReply::Unexpected(err.to_string())),
        Err(err) => Err(unavailable(err)),
    }
}

fn unavailable(err: MemcacheError) -> CacheError {
    CacheError::unavailable(BackendKind::Memcached, err)
}

#[async_trait]
impl MemcachedConnection for MemcacheConnection {
    async fn get(&self, key: &str) -> CacheResult<Option<RawItem>> {
        let key = key.to_string();
        let item = self
            .run(move |client| client.get::<(Vec<u8>, u32)>(&key))
            .await?
            .map_err(unavailable)?;
        Ok(item.map(|(data, flags)| RawItem::new(data, flags)))
    }

    async fn set(&self, key: &str, item: RawItem, exptime: u32) -> CacheResult<()> {
        let key = key.to_string();
        self.run(move |client| client.set(&key, item, exptime))
            .await?
            .map_err(unavailable)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let key = key.to_string();
        self.run(move |client| client.delete(&key))
            .await?
            .map_err(unavailable)
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<CounterReply> {
        let key = key.to_string();
        self.counter(move |client| client.increment(&key, delta))
            .await
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<CounterReply> {
        let key = key.to_string();
        self.counter(move |client| client.decrement(&key, delta))
            .await
    }

    async fn is_active(&self) -> bool {
        matches!(self.run(|client| client.version()).await, Ok(Ok(_)))
    }
}
