//! Storage manager
//!
//! Single entry point for persistence: wraps an adapter with a cache,
//! per-key write serialization, I/O timeouts, deferred writes, lifecycle
//! events and legacy-key migration.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cache::{CacheConfig, Lookup, StorageCache};
use super::events::{
    EventFilter, ListenerError, ListenerId, StorageEvent, StorageEventBus, StorageEventKind,
    StorageEventSubscriber,
};
use super::migration::{LegacyKeyResolver, MigrationRegistry};
use super::traits::{StorageAdapter, StorageResult};
use crate::shared::StorageError;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Upper bound for any single adapter call
    pub io_timeout: Duration,
    /// Delay before deferred writes are flushed
    pub debounce: Duration,
    pub cache: CacheConfig,
    /// Obsolete keys removed at initialization
    pub deprecated_keys: Vec<String>,
    pub deprecated_prefixes: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(5),
            debounce: Duration::from_millis(250),
            cache: CacheConfig::default(),
            deprecated_keys: Vec::new(),
            deprecated_prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_keys: usize,
    pub cache_entries: usize,
    pub dirty_entries: usize,
    pub operation_count: u64,
    pub error_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub migrations: u64,
    pub listener_failures: u64,
}

struct Inner {
    adapter: Arc<dyn StorageAdapter>,
    config: StorageConfig,
    cache: StorageCache,
    events: StorageEventBus,
    migrations: Arc<MigrationRegistry>,
    resolver: Option<Arc<dyn LegacyKeyResolver>>,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    flush_scheduled: AtomicBool,
    operation_count: AtomicU64,
    error_count: AtomicU64,
}

/// Cheaply cloneable handle; clones share one cache and adapter
#[derive(Clone)]
pub struct StorageManager {
    inner: Arc<Inner>,
}

pub struct StorageManagerBuilder {
    adapter: Arc<dyn StorageAdapter>,
    config: StorageConfig,
    migrations: Option<Arc<MigrationRegistry>>,
    resolver: Option<Arc<dyn LegacyKeyResolver>>,
}

impl StorageManagerBuilder {
    pub fn config(mut self, config: StorageConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`MigrationRegistry::global`]
    pub fn migrations(mut self, registry: Arc<MigrationRegistry>) -> Self {
        self.migrations = Some(registry);
        self
    }

    pub fn legacy_resolver(mut self, resolver: Arc<dyn LegacyKeyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> StorageManager {
        StorageManager {
            inner: Arc::new(Inner {
                adapter: self.adapter,
                cache: StorageCache::new(self.config.cache),
                config: self.config,
                events: StorageEventBus::new(),
                migrations: self.migrations.unwrap_or_else(MigrationRegistry::global),
                resolver: self.resolver,
                initialized: AtomicBool::new(false),
                init_lock: Mutex::new(()),
                key_locks: DashMap::new(),
                flush_scheduled: AtomicBool::new(false),
                operation_count: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
            }),
        }
    }
}

impl StorageManager {
    pub fn builder(adapter: Arc<dyn StorageAdapter>) -> StorageManagerBuilder {
        StorageManagerBuilder {
            adapter,
            config: StorageConfig::default(),
            migrations: None,
            resolver: None,
        }
    }

    pub fn new(adapter: Arc<dyn StorageAdapter>, config: StorageConfig) -> Self {
        Self::builder(adapter).config(config).build()
    }

    pub fn adapter_name(&self) -> &'static str {
        self.inner.adapter.name()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    pub fn migrations(&self) -> &Arc<MigrationRegistry> {
        &self.inner.migrations
    }

    /// Prepare the adapter and drop deprecated keys. Safe to call repeatedly
    /// and concurrently; only the first call does any work.
    pub async fn initialize(&self) -> StorageResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.inner.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let adapter = self.inner.adapter.clone();
        self.io("initialize", None, adapter.initialize()).await?;
        let removed = self.cleanup_deprecated_keys().await;

        self.inner.initialized.store(true, Ordering::Release);
        info!(adapter = adapter.name(), removed, "Storage initialized");
        Ok(())
    }

    pub async fn get(&self, key: &str, default: Value) -> StorageResult<Value> {
        Ok(self.get_value(key).await?.unwrap_or(default))
    }

    pub async fn get_value(&self, key: &str) -> StorageResult<Option<Value>> {
        self.ensure_ready()?;

        let stale = match self.inner.cache.lookup(key) {
            Lookup::Fresh(value) => {
                debug!(key, "Cache hit");
                self.emit(StorageEvent::new(StorageEventKind::Get, Some(key)).with_value(value.clone()));
                return Ok(Some(value));
            }
            Lookup::Stale(value) => Some(value),
            Lookup::Miss => None,
        };

        // Reads fill the cache under the key lock so a write cannot land
        // between the adapter read and the fill.
        let read = {
            let lock = self.key_lock(key);
            let _guard = lock.lock().await;

            if self.inner.cache.contains_fresh(key) {
                if let Some(value) = self.inner.cache.peek(key) {
                    self.emit(StorageEvent::new(StorageEventKind::Get, Some(key)).with_value(value.clone()));
                    return Ok(Some(value));
                }
            }

            let adapter = self.inner.adapter.clone();
            let read = self.io("get", Some(key), adapter.get(key)).await;
            match &read {
                Ok(Some(value)) => self.inner.cache.fill(key, value.clone()),
                Ok(None) if stale.is_some() => self.inner.cache.remove(key),
                _ => {}
            }
            read
        };

        let value = match read {
            Ok(Some(value)) => Some(value),
            // Migration takes the key lock itself
            Ok(None) => self.migrate(key).await?,
            Err(StorageError::Timeout { .. }) if stale.is_some() => {
                warn!(key, "Storage read timed out; serving cached value");
                stale
            }
            Err(e) => return Err(e),
        };

        let mut event = StorageEvent::new(StorageEventKind::Get, Some(key));
        if let Some(v) = &value {
            event = event.with_value(v.clone());
        }
        self.emit(event);
        Ok(value)
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get_value(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Write through to the adapter; the cache only changes once the write
    /// succeeded.
    pub async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.ensure_ready()?;
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let adapter = self.inner.adapter.clone();
        self.io("set", Some(key), adapter.set(key, &value)).await?;
        self.inner.cache.insert(key, value.clone());

        debug!(key, "Stored value");
        self.emit(StorageEvent::new(StorageEventKind::Set, Some(key)).with_value(value));
        Ok(())
    }

    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        self.set(key, serde_json::to_value(value)?).await
    }

    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        self.ensure_ready()?;
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let adapter = self.inner.adapter.clone();
        self.io("remove", Some(key), adapter.remove(key)).await?;
        self.inner.cache.remove(key);

        self.emit(StorageEvent::new(StorageEventKind::Remove, Some(key)));
        Ok(())
    }

    /// Remove every key, including pending deferred writes
    pub async fn clear(&self) -> StorageResult<()> {
        self.ensure_ready()?;
        let adapter = self.inner.adapter.clone();
        self.io("clear", None, adapter.clear()).await?;
        self.inner.cache.clear();

        info!(adapter = adapter.name(), "Storage cleared");
        self.emit(StorageEvent::new(StorageEventKind::Clear, None));
        Ok(())
    }

    pub async fn has(&self, key: &str) -> StorageResult<bool> {
        self.ensure_ready()?;
        if self.inner.cache.contains_fresh(key) {
            return Ok(true);
        }
        let adapter = self.inner.adapter.clone();
        self.io("has", Some(key), adapter.has(key)).await
    }

    /// Persisted keys plus keys with pending deferred writes
    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_ready()?;
        let adapter = self.inner.adapter.clone();
        let mut keys = self.io("keys", None, adapter.keys()).await?;
        keys.extend(self.inner.cache.dirty_keys());
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Cache-only read; never touches the adapter
    pub fn get_sync(&self, key: &str, default: Value) -> StorageResult<Value> {
        self.ensure_ready()?;
        let value = self.inner.cache.peek(key);
        let mut event = StorageEvent::new(StorageEventKind::Get, Some(key));
        if let Some(v) = &value {
            event = event.with_value(v.clone());
        }
        self.emit(event);
        Ok(value.unwrap_or(default))
    }

    /// Update the cache now and persist later.
    ///
    /// Repeated writes to one key before the flush coalesce; only the latest
    /// value reaches the adapter.
    pub fn set_sync(&self, key: &str, value: Value) -> StorageResult<()> {
        self.ensure_ready()?;
        self.inner.cache.insert_dirty(key, value.clone());
        self.emit(
            StorageEvent::new(StorageEventKind::Set, Some(key))
                .with_value(value)
                .with_reason("deferred"),
        );
        self.schedule_flush();
        Ok(())
    }

    /// Persist all pending deferred writes; returns how many keys were written
    pub async fn flush(&self) -> StorageResult<usize> {
        self.ensure_ready()?;
        let keys = self.inner.cache.dirty_keys();
        if keys.is_empty() {
            return Ok(0);
        }

        // Sorted acquisition keeps concurrent flushes deadlock-free.
        let locks: Vec<Arc<Mutex<()>>> = keys.iter().map(|k| self.key_lock(k)).collect();
        let mut guards = Vec::with_capacity(locks.len());
        for lock in &locks {
            guards.push(lock.lock().await);
        }

        let entries: Vec<(String, Value)> = keys
            .into_iter()
            .filter_map(|key| self.inner.cache.dirty_value(&key).map(|value| (key, value)))
            .collect();
        if entries.is_empty() {
            return Ok(0);
        }

        let adapter = self.inner.adapter.clone();
        self.io("flush", None, adapter.set_many(&entries)).await?;
        for (key, value) in &entries {
            self.inner.cache.mark_clean(key, value);
        }

        debug!(count = entries.len(), "Flushed deferred writes");
        Ok(entries.len())
    }

    /// Flush pending writes and release the adapter
    pub async fn close(&self) -> StorageResult<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        self.flush().await?;
        let adapter = self.inner.adapter.clone();
        self.io("close", None, adapter.close()).await?;
        self.inner.cache.clear();
        self.inner.initialized.store(false, Ordering::Release);
        info!(adapter = adapter.name(), "Storage closed");
        Ok(())
    }

    pub async fn stats(&self) -> StorageResult<StorageStats> {
        let total_keys = self.keys().await?.len();
        let cache = self.inner.cache.stats();
        Ok(StorageStats {
            total_keys,
            cache_entries: cache.entries,
            dirty_entries: cache.dirty_entries,
            operation_count: self.inner.operation_count.load(Ordering::Relaxed),
            error_count: self.inner.error_count.load(Ordering::Relaxed),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            migrations: self.inner.migrations.count(),
            listener_failures: self.inner.events.listener_failures(),
        })
    }

    pub fn on<F>(&self, filter: EventFilter, listener: F) -> ListenerId
    where
        F: Fn(&StorageEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.inner.events.on(filter, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn subscribe(&self) -> StorageEventSubscriber {
        self.inner.events.subscribe()
    }

    // ── Internals ──────────────────────────────────────────────

    fn ensure_ready(&self) -> StorageResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    fn emit(&self, event: StorageEvent) {
        self.inner.events.emit(event);
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.inner
            .key_locks
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    async fn io<T, F>(&self, operation: &'static str, key: Option<&str>, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        self.inner.operation_count.fetch_add(1, Ordering::Relaxed);
        let result = match tokio::time::timeout(self.inner.config.io_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                operation,
                key: key.map(str::to_string),
            }),
        };
        if let Err(e) = &result {
            self.inner.error_count.fetch_add(1, Ordering::Relaxed);
            warn!(operation, key, error = %e, "Storage operation failed");
            self.emit(StorageEvent::error(key, e.to_string()));
        }
        result
    }

    fn schedule_flush(&self) {
        if self.inner.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.inner.flush_scheduled.store(false, Ordering::Release);
            warn!("No async runtime; deferred writes stay pending until flush()");
            return;
        };

        let manager = self.clone();
        let delay = self.inner.config.debounce;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            manager.inner.flush_scheduled.store(false, Ordering::Release);
            if let Err(e) = manager.flush().await {
                warn!(error = %e, "Deferred flush failed; writes stay pending");
            }
        });
    }

    async fn migrate(&self, key: &str) -> StorageResult<Option<Value>> {
        let Some(resolver) = self.inner.resolver.clone() else {
            return Ok(None);
        };
        if self.inner.migrations.has_migrated(key) {
            return Ok(None);
        }
        let legacy_keys = resolver.legacy_keys(key);
        if legacy_keys.is_empty() {
            return Ok(None);
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        let adapter = self.inner.adapter.clone();

        // Another reader may have migrated while this one waited.
        if self.inner.migrations.has_migrated(key) {
            return self.io("get", Some(key), adapter.get(key)).await;
        }

        for legacy_key in legacy_keys {
            let Some(raw) = self.io("get", Some(&legacy_key), adapter.get(&legacy_key)).await? else {
                continue;
            };
            let value = match resolver.normalize(key, &legacy_key, raw) {
                Ok(value) => value,
                Err(reason) => {
                    warn!(key, legacy_key = %legacy_key, %reason, "Ignoring malformed legacy payload");
                    continue;
                }
            };

            if let Err(e) = self.io("set", Some(key), adapter.set(key, &value)).await {
                return Err(StorageError::MigrationFailure {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
            }
            self.inner.migrations.record(key);
            self.inner.cache.insert(key, value.clone());
            self.emit(
                StorageEvent::new(StorageEventKind::Set, Some(key))
                    .with_value(value.clone())
                    .with_reason(format!("migrated from {legacy_key}")),
            );

            match self.io("remove", Some(&legacy_key), adapter.remove(&legacy_key)).await {
                Ok(()) => self.emit(
                    StorageEvent::new(StorageEventKind::Remove, Some(&legacy_key))
                        .with_reason("legacy key migrated"),
                ),
                Err(e) => warn!(key, legacy_key = %legacy_key, error = %e, "Legacy key kept after migration"),
            }

            info!(key, legacy_key = %legacy_key, "Migrated legacy storage key");
            return Ok(Some(value));
        }
        Ok(None)
    }

    async fn cleanup_deprecated_keys(&self) -> usize {
        let config = &self.inner.config;
        let adapter = self.inner.adapter.clone();
        let mut doomed = config.deprecated_keys.clone();

        if !config.deprecated_prefixes.is_empty() {
            match self.io("keys", None, adapter.keys()).await {
                Ok(keys) => doomed.extend(keys.into_iter().filter(|k| {
                    config
                        .deprecated_prefixes
                        .iter()
                        .any(|prefix| k.starts_with(prefix.as_str()))
                })),
                Err(e) => warn!(error = %e, "Could not list keys for deprecated-key cleanup"),
            }
        }
        doomed.sort();
        doomed.dedup();

        let mut removed = 0;
        for key in doomed {
            match self.io("has", Some(&key), adapter.has(&key)).await {
                Ok(true) => {}
                Ok(false) | Err(_) => continue,
            }
            if self.io("remove", Some(&key), adapter.remove(&key)).await.is_ok() {
                removed += 1;
                self.emit(
                    StorageEvent::new(StorageEventKind::Remove, Some(&key))
                        .with_reason("deprecated key cleanup"),
                );
            }
        }
        removed
    }
}
