//! Storage implementation of PricedRepository

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::keys;
use super::locks::KeyedLocks;
use crate::domain::{Base, DomainError, DomainResult, NewPriced, Priced, PricedRepository};
use crate::infrastructure::storage::StorageManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionEntry {
    version: u32,
    priced_id: String,
}

/// Per-base version index. `last_version` survives deletes so numbers are
/// never handed out twice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionIndex {
    last_version: u32,
    entries: Vec<VersionEntry>,
}

pub struct StoragePricedRepository {
    storage: StorageManager,
    base_locks: KeyedLocks,
    /// Shared with the item repository; held while a version's record or
    /// its items are written.
    version_locks: KeyedLocks,
}

impl StoragePricedRepository {
    pub fn new(storage: StorageManager) -> Self {
        Self::with_version_locks(storage, KeyedLocks::default())
    }

    pub(crate) fn with_version_locks(storage: StorageManager, version_locks: KeyedLocks) -> Self {
        Self {
            storage,
            base_locks: KeyedLocks::default(),
            version_locks,
        }
    }

    async fn index(&self, base_id: &str) -> DomainResult<VersionIndex> {
        let mut index: VersionIndex = self
            .storage
            .get_as(&keys::priced_versions(base_id))
            .await?
            .unwrap_or_default();
        index.entries.sort_by_key(|e| e.version);
        Ok(index)
    }

    async fn existing(&self, id: &str) -> DomainResult<Priced> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Priced", "id", id))
    }
}

#[async_trait]
impl PricedRepository for StoragePricedRepository {
    async fn create(&self, new_priced: NewPriced) -> DomainResult<Priced> {
        let base: Option<Base> = self.storage.get_as(&keys::base(&new_priced.base_id)).await?;
        if base.is_none() {
            return Err(DomainError::not_found("Base", "id", new_priced.base_id));
        }

        let _guard = self.base_locks.lock(&new_priced.base_id).await;
        let mut index = self.index(&new_priced.base_id).await?;
        let version = index
            .entries
            .iter()
            .map(|e| e.version)
            .max()
            .unwrap_or(0)
            .max(index.last_version)
            + 1;

        let now = Utc::now();
        let priced = Priced {
            id: Uuid::new_v4().to_string(),
            base_id: new_priced.base_id,
            version,
            status: new_priced.status,
            totals: new_priced.totals,
            finalized_at: None,
            created_at: now,
            updated_at: now,
        };

        self.storage.set_as(&keys::priced(&priced.id), &priced).await?;
        index.last_version = version;
        index.entries.push(VersionEntry {
            version,
            priced_id: priced.id.clone(),
        });
        self.storage
            .set_as(&keys::priced_versions(&priced.base_id), &index)
            .await?;

        info!(priced_id = %priced.id, base_id = %priced.base_id, version, "Priced version created");
        Ok(priced)
    }

    async fn update(&self, priced: Priced) -> DomainResult<Priced> {
        let current = self.existing(&priced.id).await?;
        let _base = self.base_locks.lock(&current.base_id).await;
        let _version = self.version_locks.lock(&priced.id).await;

        // Re-read under the lock; finalization may have raced us.
        let current = self.existing(&priced.id).await?;
        if current.is_finalized() {
            return Err(DomainError::VersionFinalized {
                priced_id: current.id,
            });
        }

        let updated = Priced {
            id: current.id,
            base_id: current.base_id,
            version: current.version,
            created_at: current.created_at,
            status: priced.status,
            totals: priced.totals,
            finalized_at: priced.finalized_at,
            updated_at: Utc::now(),
        };
        self.storage.set_as(&keys::priced(&updated.id), &updated).await?;

        debug!(priced_id = %updated.id, status = %updated.status, "Priced version updated");
        Ok(updated)
    }

    async fn get_by_id(&self, id: &str) -> DomainResult<Option<Priced>> {
        Ok(self.storage.get_as(&keys::priced(id)).await?)
    }

    async fn get_latest_by_base(&self, base_id: &str) -> DomainResult<Option<Priced>> {
        let base: Option<Base> = self.storage.get_as(&keys::base(base_id)).await?;
        match base {
            Some(base) if base.is_active => {}
            _ => return Ok(None),
        }
        match self.index(base_id).await?.entries.last() {
            Some(entry) => self.get_by_id(&entry.priced_id).await,
            None => Ok(None),
        }
    }

    async fn get_version(&self, base_id: &str, version: u32) -> DomainResult<Option<Priced>> {
        let index = self.index(base_id).await?;
        match index.entries.iter().find(|e| e.version == version) {
            Some(entry) => self.get_by_id(&entry.priced_id).await,
            None => Ok(None),
        }
    }

    async fn list_versions(&self, base_id: &str) -> DomainResult<Vec<Priced>> {
        let index = self.index(base_id).await?;
        let loaded = try_join_all(index.entries.iter().map(|e| self.get_by_id(&e.priced_id))).await?;
        Ok(loaded.into_iter().flatten().collect())
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        let current = self.existing(id).await?;
        let _base = self.base_locks.lock(&current.base_id).await;
        let _version = self.version_locks.lock(id).await;

        let current = self.existing(id).await?;
        if current.is_finalized() {
            return Err(DomainError::VersionFinalized {
                priced_id: current.id,
            });
        }

        let mut index = self.index(&current.base_id).await?;
        index.entries.retain(|e| e.priced_id != current.id);
        self.storage
            .set_as(&keys::priced_versions(&current.base_id), &index)
            .await?;
        self.storage.remove(&keys::priced_items(&current.id)).await?;
        self.storage.remove(&keys::priced(&current.id)).await?;

        info!(priced_id = %current.id, version = current.version, "Priced version deleted");
        Ok(())
    }
}
