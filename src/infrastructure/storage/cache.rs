//! In-memory cache in front of the storage adapter
//!
//! Entries are either clean (mirroring what the adapter holds) or dirty
//! (written by `set_sync` and not yet flushed). Dirty entries are never
//! evicted or expired, since they are the only copy of the value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// `None` keeps entries until evicted by size
    pub ttl: Option<Duration>,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(300)),
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    dirty: bool,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Fresh(Value),
    /// Past its TTL; still the last known-good value
    Stale(Value),
    Miss,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub dirty_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct StorageCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl StorageCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn lookup(&self, key: &str) -> Lookup {
        let result = match self.entries.get(key) {
            None => Lookup::Miss,
            Some(entry) if entry.dirty || !self.is_expired(&entry) => Lookup::Fresh(entry.value.clone()),
            Some(entry) => Lookup::Stale(entry.value.clone()),
        };
        match result {
            Lookup::Fresh(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            _ => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    /// Any cached value regardless of age
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn contains_fresh(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.dirty || !self.is_expired(&e))
            .unwrap_or(false)
    }

    /// Store a value the adapter already holds
    pub fn insert(&self, key: &str, value: Value) {
        self.put(key, value, false);
    }

    /// Populate from an adapter read without clobbering a pending deferred write
    pub fn fill(&self, key: &str, value: Value) {
        if !self.is_dirty(key) {
            self.put(key, value, false);
        }
    }

    /// Store a value not yet written to the adapter
    pub fn insert_dirty(&self, key: &str, value: Value) {
        self.put(key, value, true);
    }

    fn put(&self, key: &str, value: Value, dirty: bool) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                dirty,
            },
        );
        self.evict_overflow();
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.entries.get(key).map(|e| e.dirty).unwrap_or(false)
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.dirty)
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Current value of a dirty entry, `None` if clean or absent
    pub fn dirty_value(&self, key: &str) -> Option<Value> {
        self.entries
            .get(key)
            .filter(|e| e.dirty)
            .map(|e| e.value.clone())
    }

    /// Mark an entry clean after a flush, unless it changed in the meantime
    pub fn mark_clean(&self, key: &str, flushed: &Value) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.dirty && entry.value == *flushed {
                entry.dirty = false;
                entry.stored_at = Instant::now();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            dirty_entries: self.entries.iter().filter(|e| e.dirty).count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        match self.config.ttl {
            Some(ttl) => entry.stored_at.elapsed() > ttl,
            None => false,
        }
    }

    // Oldest clean entries go first.
    fn evict_overflow(&self) {
        while self.entries.len() > self.config.max_entries {
            let oldest = self
                .entries
                .iter()
                .filter(|e| !e.dirty)
                .min_by_key(|e| e.stored_at)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }
}

impl Default for StorageCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
