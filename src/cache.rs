//! Size- and TTL-bounded local cache, and the read-through layer that fronts
//! remote queries with it.
//!
//! [`CacheStore`] is a plain synchronous store: `get` treats expired entries as
//! misses and drops them, `set` evicts (expired first, then oldest-inserted)
//! until the new entry fits the byte budget. [`QueryCache`] shares a store
//! between fetch consumers and persists fetched results on a spawned task so the
//! read path never waits for the write.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("entry {key:?} is {size} bytes, larger than the whole {budget} byte budget")]
    EntryTooLarge {
        key: String,
        size: usize,
        budget: usize,
    },
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("failed to encode cache value: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Escape one component of a `/`-joined cache key so distinct components can
/// never produce the same key. `%`, `/` and `#` are percent-encoded.
pub fn key_segment(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '#' => out.push_str("%23"),
            _ => out.push(c),
        }
    }
    out
}

/// One stored value.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub inserted_at: Instant,
    pub ttl: Duration,
    seq: u64,
}

impl CacheEntry {
    /// Bytes charged against the budget.
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CacheCounters {
    get_hits: u64,
    get_misses: u64,
    inserts: u64,
    updates: u64,
    evictions: u64,
    expirations: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub get_hits: u64,
    pub get_misses: u64,
    pub inserts: u64,
    pub updates: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries dropped because their TTL ran out.
    pub expirations: u64,

    // gauges captured at snapshot time
    pub len: usize,
    pub total_size: usize,
    pub budget: usize,
}

/// Byte-budgeted store with per-entry TTL.
#[derive(Debug)]
pub struct CacheStore<C: Clock = SystemClock> {
    budget: usize,
    total_size: usize,
    entries: HashMap<String, CacheEntry>,
    // insertion order: seq -> key
    order: BTreeMap<u64, String>,
    next_seq: u64,
    clock: C,
    counters: CacheCounters,
}

impl CacheStore<SystemClock> {
    pub fn new(budget_bytes: usize) -> Self {
        Self::with_clock(budget_bytes, SystemClock)
    }
}

impl<C: Clock> CacheStore<C> {
    pub fn with_clock(budget_bytes: usize, clock: C) -> Self {
        Self {
            budget: budget_bytes,
            total_size: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            clock,
            counters: CacheCounters::default(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up `key`. An expired entry is removed and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<&[u8]> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            None => {
                self.counters.get_misses += 1;
                return None;
            }
            Some(e) => e.is_expired(now),
        };
        if expired {
            self.remove_entry(key);
            self.counters.expirations += 1;
            self.counters.get_misses += 1;
            log::debug!("cache expired: {key}");
            return None;
        }
        self.counters.get_hits += 1;
        self.entries.get(key).map(|e| e.value.as_slice())
    }

    /// Insert `value` under `key`, evicting until the store fits its budget.
    ///
    /// A value that could never fit is rejected; any older value under the same
    /// key is dropped either way so stale data is not served.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> CacheResult<()> {
        let key = key.into();
        let size = key.len() + value.len();
        let replaced = self.remove_entry(&key).is_some();
        if size > self.budget {
            return Err(CacheError::EntryTooLarge {
                key,
                size,
                budget: self.budget,
            });
        }
        if self.total_size + size > self.budget {
            self.make_room(size);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.total_size += size;
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                inserted_at: self.clock.now(),
                ttl,
                seq,
            },
        );
        if replaced {
            self.counters.updates += 1;
        } else {
            self.counters.inserts += 1;
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.remove_entry(key)
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .order
            .values()
            .filter(|k| self.entries.get(*k).is_some_and(|e| e.is_expired(now)))
            .cloned()
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }
        self.counters.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_size = 0;
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        let c = self.counters;
        CacheMetricsSnapshot {
            get_hits: c.get_hits,
            get_misses: c.get_misses,
            inserts: c.inserts,
            updates: c.updates,
            evictions: c.evictions,
            expirations: c.expirations,
            len: self.entries.len(),
            total_size: self.total_size,
            budget: self.budget,
        }
    }

    fn fits(&self, incoming: usize) -> bool {
        self.total_size + incoming <= self.budget
    }

    fn make_room(&mut self, incoming: usize) {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .order
            .values()
            .filter(|k| self.entries.get(*k).is_some_and(|e| e.is_expired(now)))
            .cloned()
            .collect();
        for key in expired {
            if self.fits(incoming) {
                return;
            }
            self.remove_entry(&key);
            self.counters.expirations += 1;
        }
        while !self.fits(incoming) {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(e) = self.entries.remove(&key) {
                self.total_size -= e.size();
                self.counters.evictions += 1;
                log::debug!("cache evicted: {key} ({} bytes)", e.size());
            }
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let e = self.entries.remove(key)?;
        self.order.remove(&e.seq);
        self.total_size -= e.size();
        Some(e)
    }
}

/// Shared read-through cache in front of remote queries.
///
/// Values are stored as JSON. Construct one per application and hand clones to
/// each fetch consumer; call [`QueryCache::flush`] before tearing it down.
pub struct QueryCache<C: Clock + Send + 'static = SystemClock> {
    store: Arc<Mutex<CacheStore<C>>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
    default_ttl: Duration,
}

impl<C: Clock + Send + 'static> Clone for QueryCache<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pending: Arc::clone(&self.pending),
            default_ttl: self.default_ttl,
        }
    }
}

impl<C: Clock + Send + 'static> QueryCache<C> {
    pub fn new(store: CacheStore<C>, default_ttl: Duration) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            pending: Arc::new(Mutex::new(Vec::new())),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Run `f` against the underlying store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut CacheStore<C>) -> R) -> CacheResult<R> {
        let mut store = self.store.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(f(&mut store))
    }

    /// Cached value for `key`, if present, fresh and decodable. Undecodable
    /// values are dropped and reported as misses.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut store = match self.store.lock() {
            Ok(s) => s,
            Err(_) => {
                log::warn!("cache lock poisoned; bypassing cache for {key}");
                return None;
            }
        };
        let decoded = serde_json::from_slice::<T>(store.get(key)?);
        match decoded {
            Ok(v) => {
                log::debug!("cache hit: {key}");
                Some(v)
            }
            Err(e) => {
                log::warn!("dropping undecodable cache entry {key}: {e}");
                store.remove(key);
                None
            }
        }
    }

    /// Store `value` synchronously.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let mut store = self.store.lock().map_err(|_| CacheError::Poisoned)?;
        store.set(key, bytes, ttl.unwrap_or(self.default_ttl))
    }

    /// Try the cache, else run `fetch`; a fetched value is returned at once and
    /// written to the cache in the background. Write failures are only logged.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }
        log::debug!("cache miss: {key}");
        let value = fetch().await?;
        self.persist_in_background(key, &value, ttl.unwrap_or(self.default_ttl));
        Ok(value)
    }

    fn persist_in_background<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("cache write for {key} skipped: {e}");
                return;
            }
        };
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        let write = move || match store.lock() {
            Ok(mut s) => {
                if let Err(e) = s.set(key.as_str(), bytes, ttl) {
                    log::warn!("cache write for {key} failed: {e}");
                }
            }
            Err(_) => log::warn!("cache write for {key} failed: {}", CacheError::Poisoned),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(async move { write() });
                match self.pending.lock() {
                    Ok(mut pending) => {
                        pending.retain(|h| !h.is_finished());
                        pending.push(task);
                    }
                    Err(_) => log::warn!("pending write list poisoned; write left untracked"),
                }
            }
            // no runtime to hand the write to
            Err(_) => write(),
        }
    }

    /// Wait for every background write started so far.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for h in handles {
            if let Err(e) = h.await {
                log::warn!("cache write task failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store(budget: usize) -> CacheStore<ManualClock> {
        CacheStore::with_clock(budget, ManualClock::new())
    }

    const MIN: Duration = Duration::from_secs(60);

    #[test]
    fn key_segments_are_escaped() {
        assert_eq!(key_segment("train/loss"), "train%2Floss");
        assert_eq!(key_segment("a#b%c"), "a%23b%25c");
        assert_eq!(key_segment("plain-run_7"), "plain-run_7");
        assert_ne!(
            format!("{}/{}", key_segment("r/a"), key_segment("b")),
            format!("{}/{}", key_segment("r"), key_segment("a/b"))
        );
    }

    #[test]
    fn get_returns_what_was_set() {
        let mut s = store(100);
        s.set("a", b"hello".to_vec(), MIN).unwrap();
        assert_eq!(s.get("a"), Some(&b"hello"[..]));
        assert_eq!(s.total_size(), 6);
        assert_eq!(s.get("b"), None);
        let m = s.metrics();
        assert_eq!((m.get_hits, m.get_misses), (1, 1));
    }

    #[test]
    fn expired_get_is_miss_and_deletes() {
        let mut s = store(100);
        s.set("a", vec![1, 2, 3], Duration::from_millis(500)).unwrap();
        s.clock().advance_ms(499);
        assert!(s.get("a").is_some());
        s.clock().advance_ms(1);
        assert!(s.get("a").is_none());
        assert!(!s.contains_key("a"));
        assert_eq!(s.total_size(), 0);
    }

    #[test]
    fn evicts_oldest_until_it_fits() {
        let mut s = store(30);
        s.set("k1", vec![0; 8], MIN).unwrap(); // 10
        s.set("k2", vec![0; 8], MIN).unwrap(); // 20
        s.set("k3", vec![0; 8], MIN).unwrap(); // 30
        s.set("k4", vec![0; 8], MIN).unwrap();
        assert!(!s.contains_key("k1"));
        assert!(s.contains_key("k2") && s.contains_key("k3") && s.contains_key("k4"));
        assert!(s.total_size() <= s.budget());
        assert_eq!(s.metrics().evictions, 1);
    }

    #[test]
    fn expired_entries_go_before_older_live_ones() {
        let mut s = store(30);
        s.set("old", vec![0; 7], MIN).unwrap();
        s.set("short", vec![0; 5], Duration::from_millis(10)).unwrap();
        s.set("mid", vec![0; 7], MIN).unwrap();
        s.clock().advance_ms(20);
        s.set("new", vec![0; 7], MIN).unwrap();
        assert!(!s.contains_key("short"));
        assert!(s.contains_key("old"));
        assert!(s.contains_key("new"));
        assert_eq!(s.metrics().evictions, 0);
        assert_eq!(s.metrics().expirations, 1);
    }

    #[test]
    fn overwrite_replaces_size_and_refreshes_order() {
        let mut s = store(30);
        s.set("a", vec![0; 9], MIN).unwrap();
        s.set("b", vec![0; 9], MIN).unwrap();
        s.set("a", vec![0; 4], MIN).unwrap();
        assert_eq!(s.total_size(), 15);
        s.set("c", vec![0; 19], MIN).unwrap();
        // "b" is now the oldest insertion
        assert!(!s.contains_key("b"));
        assert!(s.contains_key("a") && s.contains_key("c"));
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let mut s = store(10);
        s.set("a", vec![0; 3], MIN).unwrap();
        let err = s.set("a", vec![0; 64], MIN).unwrap_err();
        assert!(matches!(err, CacheError::EntryTooLarge { size: 65, .. }));
        assert!(s.is_empty());
    }

    #[test]
    fn purge_drops_only_expired() {
        let mut s = store(100);
        s.set("a", vec![1], Duration::from_millis(5)).unwrap();
        s.set("b", vec![1], MIN).unwrap();
        s.clock().advance_ms(10);
        assert_eq!(s.purge_expired(), 1);
        assert_eq!(s.len(), 1);
    }
}
