//! Storage-backed repository implementations
//!
//! Per-aggregate repositories over [`StorageManager`] + unified
//! RepositoryProvider.
//!
//! [`StorageManager`]: crate::infrastructure::storage::StorageManager

pub mod base_repository;
pub mod keys;
pub mod priced_item_repository;
pub mod priced_repository;
pub mod repository_provider;
pub mod snapshot_repository;
pub mod tender_pricing;

mod locks;

pub use base_repository::StorageBaseRepository;
pub use priced_item_repository::StoragePricedItemRepository;
pub use priced_repository::StoragePricedRepository;
pub use repository_provider::StorageRepositoryProvider;
pub use snapshot_repository::StorageSnapshotRepository;
pub use tender_pricing::{TenderPricingResolver, TenderPricingStore};

#[cfg(test)]
pub(crate) async fn test_storage() -> crate::infrastructure::storage::StorageManager {
    use crate::infrastructure::storage::{MemoryAdapter, MigrationRegistry, StorageManager};
    use std::sync::Arc;

    let storage = StorageManager::builder(Arc::new(MemoryAdapter::new()))
        .migrations(Arc::new(MigrationRegistry::new()))
        .build();
    storage.initialize().await.expect("memory storage initializes");
    storage
}
