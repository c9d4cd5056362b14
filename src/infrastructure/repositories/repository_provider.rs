//! Storage implementation of RepositoryProvider

use crate::domain::repositories::RepositoryProvider;
use crate::domain::{BaseRepository, PricedItemRepository, PricedRepository, SnapshotRepository};
use crate::infrastructure::storage::StorageManager;

use super::base_repository::StorageBaseRepository;
use super::locks::KeyedLocks;
use super::priced_item_repository::StoragePricedItemRepository;
use super::priced_repository::StoragePricedRepository;
use super::snapshot_repository::StorageSnapshotRepository;

/// Unified repository provider backed by one [`StorageManager`].
///
/// ```ignore
/// let repos = StorageRepositoryProvider::new(storage.clone());
/// let latest = repos.priced().get_latest_by_base(&base_id).await?;
/// let items = repos.priced_items().list(&latest.unwrap().id).await?;
/// ```
pub struct StorageRepositoryProvider {
    bases: StorageBaseRepository,
    priced: StoragePricedRepository,
    priced_items: StoragePricedItemRepository,
    snapshots: StorageSnapshotRepository,
}

impl StorageRepositoryProvider {
    pub fn new(storage: StorageManager) -> Self {
        let version_locks = KeyedLocks::default();
        Self {
            bases: StorageBaseRepository::new(storage.clone()),
            priced: StoragePricedRepository::with_version_locks(storage.clone(), version_locks.clone()),
            priced_items: StoragePricedItemRepository::with_version_locks(storage.clone(), version_locks),
            snapshots: StorageSnapshotRepository::new(storage),
        }
    }
}

impl RepositoryProvider for StorageRepositoryProvider {
    fn bases(&self) -> &dyn BaseRepository {
        &self.bases
    }

    fn priced(&self) -> &dyn PricedRepository {
        &self.priced
    }

    fn priced_items(&self) -> &dyn PricedItemRepository {
        &self.priced_items
    }

    fn snapshots(&self) -> &dyn SnapshotRepository {
        &self.snapshots
    }
}
