use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Named async locks, created on first use. Clones share the same set.
#[derive(Clone, Default)]
pub(crate) struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(name.to_string()).or_default().clone();
        lock.lock_owned().await
    }
}
