//! Storage implementation of SnapshotRepository

use async_trait::async_trait;
use tracing::info;

use super::keys;
use super::locks::KeyedLocks;
use crate::domain::{DomainError, DomainResult, Snapshot, SnapshotRepository};
use crate::infrastructure::storage::StorageManager;

pub struct StorageSnapshotRepository {
    storage: StorageManager,
    locks: KeyedLocks,
}

impl StorageSnapshotRepository {
    pub fn new(storage: StorageManager) -> Self {
        Self {
            storage,
            locks: KeyedLocks::default(),
        }
    }
}

#[async_trait]
impl SnapshotRepository for StorageSnapshotRepository {
    async fn create(&self, snapshot: Snapshot) -> DomainResult<Snapshot> {
        let key = keys::snapshot(&snapshot.priced_id);
        let _guard = self.locks.lock(&snapshot.priced_id).await;

        if self.storage.has(&key).await? {
            return Err(DomainError::AlreadyFinalized {
                priced_id: snapshot.priced_id,
            });
        }
        self.storage.set_as(&key, &snapshot).await?;

        info!(priced_id = %snapshot.priced_id, "Snapshot stored");
        Ok(snapshot)
    }

    async fn get_by_priced(&self, priced_id: &str) -> DomainResult<Option<Snapshot>> {
        Ok(self.storage.get_as(&keys::snapshot(priced_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SnapshotMeta;
    use crate::infrastructure::repositories::test_storage;
    use chrono::Utc;

    fn snapshot(priced_id: &str, hash: &str) -> Snapshot {
        Snapshot {
            priced_id: priced_id.into(),
            integrity_hash: hash.into(),
            totals_hash: hash.into(),
            config_hash: None,
            meta: SnapshotMeta::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_snapshot_is_rejected() {
        let repo = StorageSnapshotRepository::new(test_storage().await);
        repo.create(snapshot("p1", "aaa")).await.unwrap();

        let result = repo.create(snapshot("p1", "bbb")).await;
        assert!(matches!(result, Err(DomainError::AlreadyFinalized { .. })));

        let stored = repo.get_by_priced("p1").await.unwrap().unwrap();
        assert_eq!(stored.integrity_hash, "aaa");
    }

    #[tokio::test]
    async fn missing_snapshot_is_none() {
        let repo = StorageSnapshotRepository::new(test_storage().await);
        assert!(repo.get_by_priced("p1").await.unwrap().is_none());
    }
}
