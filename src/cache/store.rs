//! A single named key → response table with insertion-ordered enumeration.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::http::Response;

use super::lock::{rw_read, rw_write};

/// One stored response.
///
/// `seq` orders entries for FIFO eviction only; reading an entry never moves
/// it. Re-putting a key gives it a fresh `seq`, making it the newest.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    response: Response,
    stored_at: SystemTime,
    seq: u64,
}

impl CacheEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    /// Wall-clock time at which the entry was written.
    pub fn stored_at(&self) -> SystemTime {
        self.stored_at
    }

    /// Payload byte length.
    pub fn size(&self) -> usize {
        self.response.body_len()
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, key: String, response: Response, stored_at: SystemTime) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(previous) = self.entries.remove(&key) {
            self.order.remove(&previous.seq);
        }
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                response,
                stored_at,
                seq,
            },
        );
    }
}

/// A named cache store.
///
/// Keys are unique; putting an existing key replaces its payload and moves it
/// to the newest end of the insertion order. All operations take a short
/// internal lock and never suspend, so unrelated keys can be read and written
/// concurrently from many tasks. Same-key writers race; the last one wins.
///
/// # Examples
///
/// ```
/// use reelcache::cache::CacheStore;
/// use reelcache::http::{Response, StatusCode};
///
/// let store = CacheStore::new("reel-v1-images");
/// store.put("GET https://archive.org/services/img/a", Response::new(StatusCode::OK));
/// store.put("GET https://archive.org/services/img/b", Response::new(StatusCode::OK));
///
/// assert_eq!(store.len(), 2);
/// assert_eq!(store.keys()[0], "GET https://archive.org/services/img/a");
/// ```
#[derive(Debug)]
pub struct CacheStore {
    name: String,
    inner: RwLock<Inner>,
}

impl CacheStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a copy of the entry stored under `key`.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        rw_read(&self.inner, "store.get").entries.get(key).cloned()
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.inner, "store.contains")
            .entries
            .contains_key(key)
    }

    /// Stores `response` under `key`, stamped with the current time.
    pub fn put(&self, key: impl Into<String>, response: Response) {
        self.put_at(key, response, SystemTime::now());
    }

    /// Stores `response` under `key` with an explicit storage time.
    pub fn put_at(&self, key: impl Into<String>, response: Response, stored_at: SystemTime) {
        rw_write(&self.inner, "store.put").insert(key.into(), response, stored_at);
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = rw_write(&self.inner, "store.delete");
        match inner.entries.remove(key) {
            Some(entry) => {
                inner.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    /// Keys in insertion order, oldest first.
    pub fn keys(&self) -> Vec<String> {
        rw_read(&self.inner, "store.keys")
            .order
            .values()
            .cloned()
            .collect()
    }

    /// Entries in insertion order, oldest first.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let inner = rw_read(&self.inner, "store.entries");
        inner
            .order
            .values()
            .filter_map(|key| inner.entries.get(key).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, "store.len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of payload byte lengths across all entries.
    pub fn byte_size(&self) -> u64 {
        rw_read(&self.inner, "store.byte_size")
            .entries
            .values()
            .map(|entry| entry.size() as u64)
            .sum()
    }

    /// Removes the oldest entries until at most `keep` remain, under a single
    /// write lock. Returns the removed keys, oldest first.
    pub fn evict_oldest_beyond(&self, keep: usize) -> Vec<String> {
        let mut inner = rw_write(&self.inner, "store.evict");
        let excess = inner.entries.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);
        for _ in 0..excess {
            let Some((_, key)) = inner.order.pop_first() else {
                break;
            };
            inner.entries.remove(&key);
            removed.push(key);
        }
        removed
    }
}
