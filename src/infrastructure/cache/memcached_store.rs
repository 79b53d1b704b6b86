//! Memcached-backed shared cache.
//!
//! Memcached stores opaque bytes plus a 32-bit `flags` word per item. Values
//! are kept in their natural wire form and the flags record how to read them
//! back, so integers stay as decimal text that the server's own `incr`/`decr`
//! can operate on.
//!
//! # Counters
//!
//! Memcached has no "increment or create" command. `incr` on a missing key
//! answers `NOT_FOUND`, and the store then creates the key with a separate
//! `set`. Two callers racing on the same cold key can both see `NOT_FOUND`
//! and both `set`, losing one update. Callers that need exact counts under
//! concurrent cold starts must create the counter up front.
//!
//! A cold `decrement` stores `-amount`. Memcached counters are unsigned, so
//! the server refuses `incr`/`decr` on that value and every later counter
//! call on the key fails with [`CacheError::CounterState`] until the key is
//! overwritten with `set`. Plain `get` still reads it back as a negative
//! integer.
//!
//! # Keys
//!
//! The text protocol delimits keys with whitespace and caps them at 250
//! bytes. Keys that are empty, longer than that, or contain a space or a
//! control character are rejected with [`CacheError::InvalidKey`] before any
//! command is sent.

use crate::domain::{BackendKind, CacheValue, SharedCacheStore};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Item flags identifying how the stored bytes are encoded.
pub mod flags {
    /// UTF-8 string, stored verbatim.
    pub const TEXT: u32 = 0;
    /// Signed decimal integer; the server's `incr`/`decr` apply to it.
    pub const INTEGER: u32 = 1;
    /// Any other value, as a JSON document.
    pub const JSON: u32 = 2;
}

/// Relative expirations longer than 30 days are read by memcached as Unix timestamps.
const MAX_RELATIVE_EXPTIME: u64 = 60 * 60 * 24 * 30;

/// Longest key the memcached text protocol accepts, in bytes.
const MAX_KEY_LEN: usize = 250;

/// An item as it travels over the memcached protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub data: Vec<u8>,
    pub flags: u32,
}

impl RawItem {
    pub fn new(data: Vec<u8>, flags: u32) -> Self {
        Self { data, flags }
    }

    pub fn integer(value: i64) -> Self {
        Self::new(value.to_string().into_bytes(), flags::INTEGER)
    }
}

/// Reply to a native `incr`/`decr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterReply {
    /// The counter's new value.
    Value(u64),
    /// The key does not exist.
    NotFound,
    /// Any other protocol-level answer, verbatim.
    Unexpected(String),
}

/// The subset of memcached commands the store relies on.
///
/// Implementations wrap a client that is already connected; see
/// [`crate::infrastructure::cache::MemcacheConnection`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemcachedConnection: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<RawItem>>;

    /// `set` with the raw protocol `exptime` (0 means no expiry).
    async fn set(&self, key: &str, item: RawItem, exptime: u32) -> CacheResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<CounterReply>;

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<CounterReply>;

    /// Whether the server is currently reachable.
    async fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
enum CounterOp {
    Incr,
    Decr,
}

/// Shared cache over memcached.
#[derive(Clone)]
pub struct MemcachedBackedStore {
    conn: Arc<dyn MemcachedConnection>,
}

impl MemcachedBackedStore {
    /// Wraps an already-connected memcached client.
    pub fn new(conn: Arc<dyn MemcachedConnection>) -> Self {
        Self { conn }
    }

    /// Whether the underlying connection is currently usable.
    pub async fn is_active(&self) -> bool {
        self.conn.is_active().await
    }

    async fn apply_counter(
        &self,
        key: &str,
        op: CounterOp,
        delta: u64,
        initial: i64,
    ) -> CacheResult<i64> {
        let reply = match op {
            CounterOp::Incr => self.conn.increment(key, delta).await?,
            CounterOp::Decr => self.conn.decrement(key, delta).await?,
        };

        match reply {
            CounterReply::Value(value) => i64::try_from(value).map_err(|_| {
                CacheError::counter_state(
                    BackendKind::Memcached,
                    key,
                    format!("{value} does not fit a signed counter"),
                )
            }),
            CounterReply::NotFound => {
                warn!(
                    key = %key,
                    initial,
                    "Memcached counter missing, initializing with a non-atomic set"
                );
                self.conn.set(key, RawItem::integer(initial), 0).await?;
                Ok(initial)
            }
            CounterReply::Unexpected(reply) => Err(CacheError::counter_state(
                BackendKind::Memcached,
                key,
                reply,
            )),
        }
    }
}

fn validate_key(key: &str) -> CacheResult<()> {
    let reason = if key.is_empty() {
        "key is empty".to_string()
    } else if key.len() > MAX_KEY_LEN {
        format!("key is {} bytes, limit is {MAX_KEY_LEN}", key.len())
    } else if key.bytes().any(|b| b <= b' ' || b == 0x7f) {
        "key contains whitespace or control characters".to_string()
    } else {
        return Ok(());
    };

    Err(CacheError::invalid_key(BackendKind::Memcached, key, reason))
}

/// Maps a TTL in seconds onto the memcached `exptime` field.
fn exptime(ttl_seconds: Option<u64>) -> u32 {
    match ttl_seconds {
        None | Some(0) => 0,
        Some(ttl) if ttl <= MAX_RELATIVE_EXPTIME => ttl as u32,
        Some(ttl) => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0);
            u32::try_from(now.saturating_add(ttl)).unwrap_or(u32::MAX)
        }
    }
}

fn encode(key: &str, value: &CacheValue) -> CacheResult<RawItem> {
    match value {
        CacheValue::String(text) => Ok(RawItem::new(text.as_bytes().to_vec(), flags::TEXT)),
        CacheValue::Number(number) if number.is_i64() || number.is_u64() => Ok(RawItem::new(
            number.to_string().into_bytes(),
            flags::INTEGER,
        )),
        other => serde_json::to_vec(other)
            .map(|data| RawItem::new(data, flags::JSON))
            .map_err(|source| CacheError::Encoding {
                key: key.to_string(),
                source,
            }),
    }
}

fn decode(key: &str, item: RawItem) -> CacheResult<CacheValue> {
    let corrupt = |reason: String| CacheError::corruption(BackendKind::Memcached, key, reason);

    match item.flags {
        flags::TEXT => String::from_utf8(item.data)
            .map(CacheValue::String)
            .map_err(|e| corrupt(e.to_string())),
        flags::INTEGER => {
            // incr/decr can leave trailing spaces when the number shrinks
            let text = std::str::from_utf8(&item.data).map_err(|e| corrupt(e.to_string()))?;
            let text = text.trim();
            text.parse::<i64>()
                .map(CacheValue::from)
                .or_else(|_| text.parse::<u64>().map(CacheValue::from))
                .map_err(|e| corrupt(format!("invalid integer {text:?}: {e}")))
        }
        flags::JSON => serde_json::from_slice(&item.data).map_err(|e| corrupt(e.to_string())),
        other => Err(corrupt(format!("unknown item flags {other}"))),
    }
}

#[async_trait]
impl SharedCacheStore for MemcachedBackedStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Memcached
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        validate_key(key)?;

        match self.conn.get(key).await? {
            Some(item) => {
                debug!("Memcached HIT: {}", key);
                decode(key, item).map(Some)
            }
            None => {
                debug!("Memcached MISS: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &CacheValue,
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        validate_key(key)?;
        let item = encode(key, value)?;
        let exptime = exptime(ttl_seconds);

        self.conn.set(key, item, exptime).await?;

        debug!("Memcached SET: {} (exptime: {})", key, exptime);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        validate_key(key)?;

        if self.conn.delete(key).await? {
            debug!("Memcached DEL: {}", key);
        }
        Ok(())
    }

    async fn increment(&self, key: &str, amount: i64) -> CacheResult<i64> {
        validate_key(key)?;

        if amount < 0 {
            self.apply_counter(key, CounterOp::Decr, amount.unsigned_abs(), amount)
                .await
        } else {
            self.apply_counter(key, CounterOp::Incr, amount as u64, amount)
                .await
        }
    }

    async fn decrement(&self, key: &str, amount: i64) -> CacheResult<i64> {
        validate_key(key)?;
        let initial = 0i64.saturating_sub(amount);
        if amount < 0 {
            self.apply_counter(key, CounterOp::Incr, amount.unsigned_abs(), initial)
                .await
        } else {
            self.apply_counter(key, CounterOp::Decr, amount as u64, initial)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use serde_json::json;

    fn store(mock: MockMemcachedConnection) -> MemcachedBackedStore {
        MemcachedBackedStore::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_increment_returns_native_value() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_increment()
            .with(eq("hits"), eq(3))
            .times(1)
            .returning(|_, _| Ok(CounterReply::Value(8)));
        mock.expect_set().never();

        assert_eq!(store(mock).increment("hits", 3).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_increment_cold_miss_initializes_with_amount() {
        let mut mock = MockMemcachedConnection::new();
        let mut seq = Sequence::new();
        mock.expect_increment()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CounterReply::NotFound));
        mock.expect_set()
            .withf(|key, item, exptime| {
                key == "hits" && *item == RawItem::integer(5) && *exptime == 0
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        assert_eq!(store(mock).increment("hits", 5).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_decrement_cold_miss_initializes_negative() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_decrement()
            .with(eq("stock"), eq(4))
            .returning(|_, _| Ok(CounterReply::NotFound));
        mock.expect_set()
            .withf(|_, item, _| *item == RawItem::integer(-4))
            .times(1)
            .returning(|_, _, _| Ok(()));

        assert_eq!(store(mock).decrement("stock", 4).await.unwrap(), -4);
    }

    #[tokio::test]
    async fn test_unexpected_counter_reply_is_hard_failure() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_increment().returning(|_, _| {
            Ok(CounterReply::Unexpected(
                "CLIENT_ERROR cannot increment or decrement non-numeric value".to_string(),
            ))
        });
        mock.expect_set().never();

        let err = store(mock).increment("name", 1).await.unwrap_err();

        assert!(matches!(
            err,
            CacheError::CounterState { backend: BackendKind::Memcached, .. }
        ));
    }

    #[tokio::test]
    async fn test_counter_value_beyond_i64_is_hard_failure() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_increment()
            .returning(|_, _| Ok(CounterReply::Value(u64::MAX)));

        let err = store(mock).increment("big", 1).await.unwrap_err();

        assert!(matches!(err, CacheError::CounterState { .. }));
    }

    #[tokio::test]
    async fn test_negative_amounts_use_opposite_command() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_decrement()
            .with(eq("c"), eq(2))
            .times(1)
            .returning(|_, _| Ok(CounterReply::Value(1)));
        mock.expect_increment()
            .with(eq("c"), eq(7))
            .times(1)
            .returning(|_, _| Ok(CounterReply::Value(8)));

        let store = store(mock);
        assert_eq!(store.increment("c", -2).await.unwrap(), 1);
        assert_eq!(store.decrement("c", -7).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_set_encodes_by_kind() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_set()
            .withf(|key, item, _| key == "s" && *item == RawItem::new(b"hello".to_vec(), flags::TEXT))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_set()
            .withf(|key, item, _| key == "n" && *item == RawItem::new(b"42".to_vec(), flags::INTEGER))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_set()
            .withf(|key, item, _| {
                key == "o" && *item == RawItem::new(br#"{"x":1}"#.to_vec(), flags::JSON)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = store(mock);
        store.set("s", &json!("hello"), None).await.unwrap();
        store.set("n", &json!(42), None).await.unwrap();
        store.set("o", &json!({ "x": 1 }), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_decodes_counter_with_padding() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_get()
            .returning(|_| Ok(Some(RawItem::new(b"9  ".to_vec(), flags::INTEGER))));

        assert_eq!(store(mock).get("hits").await.unwrap(), Some(json!(9)));
    }

    #[tokio::test]
    async fn test_get_unknown_flags_is_corruption() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_get()
            .returning(|_| Ok(Some(RawItem::new(b"??".to_vec(), 77))));

        let err = store(mock).get("k").await.unwrap_err();

        assert!(matches!(
            err,
            CacheError::Corruption { backend: BackendKind::Memcached, .. }
        ));
    }

    #[tokio::test]
    async fn test_get_invalid_json_is_corruption() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_get()
            .returning(|_| Ok(Some(RawItem::new(b"{oops".to_vec(), flags::JSON))));

        assert!(store(mock).get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_absent_key_succeeds() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_delete().times(2).returning(|_| Ok(false));

        let store = store(mock);
        store.delete("gone").await.unwrap();
        store.delete("gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_that_break_the_text_protocol_are_rejected() {
        let mut mock = MockMemcachedConnection::new();
        mock.expect_get().never();
        mock.expect_set().never();
        mock.expect_delete().never();
        mock.expect_increment().never();
        mock.expect_decrement().never();

        let store = store(mock);
        let long_key = "k".repeat(MAX_KEY_LEN + 1);
        let keys = ["user 1", "a\r\nflush_all", "tab\tkey", "bell\u{7}", "", long_key.as_str()];

        for key in keys {
            let err = store.get(key).await.unwrap_err();
            assert!(
                matches!(err, CacheError::InvalidKey { backend: BackendKind::Memcached, .. }),
                "get {key:?}: {err:?}"
            );
            assert!(matches!(
                store.set(key, &json!(1), None).await,
                Err(CacheError::InvalidKey { .. })
            ));
            assert!(matches!(
                store.delete(key).await,
                Err(CacheError::InvalidKey { .. })
            ));
            assert!(matches!(
                store.increment(key, 1).await,
                Err(CacheError::InvalidKey { .. })
            ));
            assert!(matches!(
                store.decrement(key, 1).await,
                Err(CacheError::InvalidKey { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_longest_and_non_ascii_keys_are_sent() {
        let long_key = "k".repeat(MAX_KEY_LEN);
        let mut mock = MockMemcachedConnection::new();
        mock.expect_get().times(2).returning(|_| Ok(None));

        let store = store(mock);
        assert_eq!(store.get(&long_key).await.unwrap(), None);
        assert_eq!(store.get("usuário:1").await.unwrap(), None);
    }

    #[test]
    fn test_exptime_mapping() {
        assert_eq!(exptime(None), 0);
        assert_eq!(exptime(Some(0)), 0);
        assert_eq!(exptime(Some(60)), 60);
        assert_eq!(exptime(Some(MAX_RELATIVE_EXPTIME)), MAX_RELATIVE_EXPTIME as u32);

        // beyond 30 days the field becomes an absolute timestamp
        let absolute = exptime(Some(MAX_RELATIVE_EXPTIME + 1));
        assert!(u64::from(absolute) > MAX_RELATIVE_EXPTIME * 12);
    }
}
