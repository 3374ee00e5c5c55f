//! Bounded least-recently-used cache of serialized lookup records.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;

use crate::error::{Error, Result};

/// LRU map from IP string to the serialized record for that address.
///
/// Not thread-safe on purpose: a single owner (the coordinator) mutates it.
pub struct LookupCache {
    entries: LruCache<String, Bytes>,
    capacity: NonZeroUsize,
}

impl LookupCache {
    /// Create an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::Config("cache capacity must be greater than zero".to_string()))?;
        Ok(Self {
            entries: LruCache::new(capacity),
            capacity,
        })
    }

    /// Get the cached record for `ip`, marking it most recently used.
    pub fn get(&mut self, ip: &str) -> Option<Bytes> {
        self.entries.get(ip).cloned()
    }

    /// Insert or overwrite the record for `ip`.
    ///
    /// When the cache is full and `ip` is new, the least recently used entry
    /// is evicted first. Returns the evicted key, if any.
    pub fn put(&mut self, ip: String, record: Bytes) -> Option<String> {
        match self.entries.push(ip, record) {
            // push hands back the old value under the same key on overwrite
            Some((evicted, _)) if !self.entries.contains(&evicted) => Some(evicted),
            _ => None,
        }
    }

    /// Drop every entry.
    ///
    /// The old map is swapped out and dropped as a whole instead of being
    /// emptied entry by entry.
    pub fn clear(&mut self) {
        self.entries = LruCache::new(self.capacity);
    }

    /// Whether `ip` is cached, without touching its recency.
    pub fn contains(&self, ip: &str) -> bool {
        self.entries.contains(ip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}
