//! Legacy key migration
//!
//! When a read misses under a current key, the manager asks a
//! [`LegacyKeyResolver`] for the deprecated names of that key. The first
//! legacy payload that normalizes cleanly is written under the current key
//! and the legacy key is removed. Each current key migrates at most once per
//! [`MigrationRegistry`].
//!
//! The registry is explicit state: the manager receives one at construction.
//! [`MigrationRegistry::global`] is the process-wide default; tests inject a
//! fresh registry or call [`MigrationRegistry::reset`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashSet;
use serde_json::Value;

/// Maps current keys to their deprecated names and upgrades old payloads
pub trait LegacyKeyResolver: Send + Sync {
    /// Legacy keys to look up for `current_key`, in priority order
    fn legacy_keys(&self, current_key: &str) -> Vec<String>;

    /// Validate and convert a legacy payload into the current shape.
    ///
    /// An `Err` means the payload is malformed; it is treated as a miss and
    /// left untouched.
    fn normalize(&self, current_key: &str, legacy_key: &str, raw: Value) -> Result<Value, String>;
}

#[derive(Default)]
pub struct MigrationRegistry {
    migrated: DashSet<String>,
    count: AtomicU64,
}

static GLOBAL_REGISTRY: OnceLock<Arc<MigrationRegistry>> = OnceLock::new();

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, created on first use
    pub fn global() -> Arc<MigrationRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(MigrationRegistry::new()))
            .clone()
    }

    pub fn has_migrated(&self, key: &str) -> bool {
        self.migrated.contains(key)
    }

    /// Returns `false` if the key was already recorded
    pub fn record(&self, key: &str) -> bool {
        let first = self.migrated.insert(key.to_string());
        if first {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        first
    }

    /// Number of keys migrated since creation or the last reset
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.migrated.clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_key_once() {
        let registry = MigrationRegistry::new();
        assert!(registry.record("tender-pricing:T-1"));
        assert!(!registry.record("tender-pricing:T-1"));
        assert!(registry.record("tender-pricing:T-2"));

        assert_eq!(registry.count(), 2);
        assert!(registry.has_migrated("tender-pricing:T-1"));
    }

    #[test]
    fn reset_clears_state() {
        let registry = MigrationRegistry::new();
        registry.record("k");
        registry.reset();

        assert_eq!(registry.count(), 0);
        assert!(!registry.has_migrated("k"));
    }

    #[test]
    fn global_is_shared() {
        assert!(Arc::ptr_eq(&MigrationRegistry::global(), &MigrationRegistry::global()));
    }
}
