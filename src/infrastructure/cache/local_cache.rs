//! Bounded in-process LRU cache (L1).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Sentinel slot index for list ends.
const NIL: usize = usize::MAX;

struct Entry<V> {
    key: String,
    value: V,
    inserted_at: Instant,
    expires_at: Option<Instant>,
    prev: usize,
    next: usize,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Arena of entries threaded on a doubly-linked recency list.
///
/// `head` is the most recently used entry, `tail` the eviction candidate.
struct LruState<V> {
    index: HashMap<String, usize>,
    slots: Vec<Option<Entry<V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    /// Bumped by every caller-initiated write or removal.
    epoch: u64,
}

impl<V> LruState<V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            epoch: 0,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn entry(&self, idx: usize) -> &Entry<V> {
        self.slots[idx]
            .as_ref()
            .unwrap_or_else(|| unreachable!("recency list points at vacant slot {idx}"))
    }

    fn entry_mut(&mut self, idx: usize) -> &mut Entry<V> {
        self.slots[idx]
            .as_mut()
            .unwrap_or_else(|| unreachable!("recency list points at vacant slot {idx}"))
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let entry = self.entry(idx);
            (entry.prev, entry.next)
        };

        if prev == NIL {
            self.head = next;
        } else {
            self.entry_mut(prev).next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else {
            self.entry_mut(next).prev = prev;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let entry = self.entry_mut(idx);
            entry.prev = NIL;
            entry.next = old_head;
        }

        if old_head == NIL {
            self.tail = idx;
        } else {
            self.entry_mut(old_head).prev = idx;
        }
        self.head = idx;
    }

    fn touch(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn remove_slot(&mut self, idx: usize) -> Entry<V> {
        self.unlink(idx);
        let entry = self.slots[idx]
            .take()
            .unwrap_or_else(|| unreachable!("removing vacant slot {idx}"));
        self.index.remove(&entry.key);
        self.free.push(idx);
        entry
    }

    fn allocate(&mut self, entry: Entry<V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        }
    }

    /// Looks up a live entry, dropping it if it has expired.
    fn live_slot(&mut self, key: &str, now: Instant) -> Option<usize> {
        let idx = *self.index.get(key)?;
        if self.entry(idx).is_expired(now) {
            self.remove_slot(idx);
            return None;
        }
        Some(idx)
    }

    fn clear(&mut self) {
        self.epoch += 1;
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }
}

/// Fixed-capacity, optionally TTL-bounded, least-recently-used cache.
///
/// All bookkeeping (key index and recency list) sits behind a single mutex,
/// so every operation is linearizable. Operations never block on I/O and
/// never fail.
///
/// Values are handed out as clones; callers never see a reference into the
/// cache.
pub struct BoundedLocalCache<V> {
    state: Mutex<LruState<V>>,
    capacity: NonZeroUsize,
    default_ttl: Option<Duration>,
}

impl<V: Clone> BoundedLocalCache<V> {
    /// Creates an empty cache.
    ///
    /// # Arguments
    ///
    /// - `capacity` - Maximum number of resident entries
    /// - `default_ttl` - Lifetime applied when `set` is called without one;
    ///   `None` or a zero duration means entries never expire by default
    pub fn new(capacity: NonZeroUsize, default_ttl: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(LruState::new()),
            capacity,
            default_ttl: default_ttl.filter(|ttl| !ttl.is_zero()),
        }
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Number of resident entries, including expired ones not yet observed.
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the value and marks the entry most recently used.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let idx = state.live_slot(key, now)?;
        state.touch(idx);
        Some(state.entry(idx).value.clone())
    }

    /// Reports whether a live entry exists without changing recency.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state.lock().live_slot(key, now).is_some()
    }

    /// Inserts or overwrites an entry.
    ///
    /// `ttl` of `None` applies the default TTL; `Some(Duration::ZERO)` stores
    /// the entry without expiry. When the insert pushes the cache over
    /// capacity, the least recently used entry is evicted.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.epoch += 1;
        self.insert(&mut state, key, value, ttl, now);
    }

    /// Current write epoch.
    ///
    /// Take it before fetching a value from elsewhere and hand it to
    /// [`Self::set_if_unchanged`].
    pub fn write_epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Inserts `value` only if no `set`, `delete` or `clear` has happened
    /// since `epoch` was read and `key` has no live entry.
    ///
    /// Returns whether the value was stored. A successful insert does not
    /// advance the epoch.
    pub fn set_if_unchanged(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
        epoch: u64,
    ) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        if state.epoch != epoch || state.live_slot(key, now).is_some() {
            return false;
        }

        self.insert(&mut state, key, value, ttl, now);
        true
    }

    fn insert(
        &self,
        state: &mut LruState<V>,
        key: &str,
        value: V,
        ttl: Option<Duration>,
        now: Instant,
    ) {
        let expires_at = match ttl.or(self.default_ttl) {
            Some(ttl) if !ttl.is_zero() => Some(now + ttl),
            _ => None,
        };

        if let Some(&idx) = state.index.get(key) {
            let entry = state.entry_mut(idx);
            entry.value = value;
            entry.inserted_at = now;
            entry.expires_at = expires_at;
            state.touch(idx);
            return;
        }

        let idx = state.allocate(Entry {
            key: key.to_string(),
            value,
            inserted_at: now,
            expires_at,
            prev: NIL,
            next: NIL,
        });
        state.index.insert(key.to_string(), idx);
        state.push_front(idx);

        while state.len() > self.capacity.get() {
            let victim = state.tail;
            let evicted = state.remove_slot(victim);
            debug!(
                key = %evicted.key,
                age_ms = u64::try_from(now.duration_since(evicted.inserted_at).as_millis())
                    .unwrap_or(u64::MAX),
                "L1 evicted least recently used entry"
            );
        }
    }

    /// Removes an entry if present.
    pub fn delete(&self, key: &str) {
        let mut state = self.state.lock();
        state.epoch += 1;
        if let Some(&idx) = state.index.get(key) {
            state.remove_slot(idx);
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired: Vec<usize> = state
            .index
            .values()
            .copied()
            .filter(|&idx| state.entry(idx).is_expired(now))
            .collect();

        for &idx in &expired {
            state.remove_slot(idx);
        }
        expired.len()
    }

    pub fn clear(&self) {
        self.state.lock().clear();
    }

    /// Resident keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut keys = Vec::with_capacity(state.len());
        let mut cursor = state.head;
        while cursor != NIL {
            let entry = state.entry(cursor);
            keys.push(entry.key.clone());
            cursor = entry.next;
        }
        keys
    }
}
