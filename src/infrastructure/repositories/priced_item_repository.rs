//! Storage implementation of PricedItemRepository

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use super::keys;
use super::locks::KeyedLocks;
use crate::domain::{DomainError, DomainResult, Priced, PricedItem, PricedItemRepository};
use crate::infrastructure::storage::StorageManager;

/// A version's items live under one key, so a swap is a single write and
/// readers observe either the previous set or the new one.
pub struct StoragePricedItemRepository {
    storage: StorageManager,
    version_locks: KeyedLocks,
}

impl StoragePricedItemRepository {
    pub fn new(storage: StorageManager) -> Self {
        Self::with_version_locks(storage, KeyedLocks::default())
    }

    /// Pass the same locks as the [`StoragePricedRepository`] so a swap and
    /// a finalization of one version never interleave.
    ///
    /// [`StoragePricedRepository`]: super::StoragePricedRepository
    pub(crate) fn with_version_locks(storage: StorageManager, version_locks: KeyedLocks) -> Self {
        Self { storage, version_locks }
    }
}

#[async_trait]
impl PricedItemRepository for StoragePricedItemRepository {
    async fn replace_all(&self, priced_id: &str, items: Vec<PricedItem>) -> DomainResult<Vec<PricedItem>> {
        let _guard = self.version_locks.lock(priced_id).await;
        let priced: Priced = self
            .storage
            .get_as(&keys::priced(priced_id))
            .await?
            .ok_or_else(|| DomainError::not_found("Priced", "id", priced_id))?;
        if priced.is_finalized() {
            return Err(DomainError::VersionFinalized {
                priced_id: priced_id.to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.base_item_id.as_str()) {
                return Err(DomainError::Validation(format!(
                    "duplicate base item {} in priced version {}",
                    item.base_item_id, priced_id
                )));
            }
        }

        let bound: Vec<PricedItem> = items.into_iter().map(|item| item.bind(priced_id)).collect();
        self.storage.set_as(&keys::priced_items(priced_id), &bound).await?;

        debug!(priced_id, count = bound.len(), "Priced items replaced");
        Ok(bound)
    }

    async fn list(&self, priced_id: &str) -> DomainResult<Vec<PricedItem>> {
        Ok(self
            .storage
            .get_as(&keys::priced_items(priced_id))
            .await?
            .unwrap_or_default())
    }

    async fn list_by_ids(&self, priced_id: &str, base_item_ids: &[String]) -> DomainResult<Vec<PricedItem>> {
        let wanted: HashSet<&str> = base_item_ids.iter().map(String::as_str).collect();
        Ok(self
            .list(priced_id)
            .await?
            .into_iter()
            .filter(|item| wanted.contains(item.base_item_id.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BaseRepository, CostBreakdown, NewBase, NewPriced, PricedRef, PricedRepository,
        PricedStatus, RepositoryProvider, Totals,
    };
    use crate::infrastructure::repositories::{
        test_storage, StorageBaseRepository, StoragePricedRepository, StorageRepositoryProvider,
    };
    use crate::infrastructure::storage::{
        EventFilter, MemoryAdapter, MigrationRegistry, StorageAdapter, StorageEventKind,
        StorageResult,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn unbound(id: &str, total: f64) -> PricedItem {
        PricedItem {
            priced_id: PricedRef::Unbound,
            base_item_id: id.into(),
            line_no: 1,
            quantity: 1.0,
            breakdown: CostBreakdown {
                labor: total,
                ..CostBreakdown::default()
            },
            unit_price: total,
            total_price: total,
            is_priced: total > 0.0,
        }
    }

    async fn setup() -> (StoragePricedRepository, StoragePricedItemRepository, Priced) {
        let storage = test_storage().await;
        let bases = StorageBaseRepository::new(storage.clone());
        let priced_repo = StoragePricedRepository::new(storage.clone());
        let base = bases.create(NewBase::active("T-1")).await.unwrap();
        let priced = priced_repo
            .create(NewPriced {
                base_id: base.id,
                status: PricedStatus::Draft,
                totals: Totals::default(),
            })
            .await
            .unwrap();
        (priced_repo, StoragePricedItemRepository::new(storage), priced)
    }

    #[tokio::test]
    async fn replace_all_binds_and_swaps() {
        let (_priced_repo, repo, priced) = setup().await;

        let first = repo
            .replace_all(&priced.id, vec![unbound("a", 1.0), unbound("b", 2.0)])
            .await
            .unwrap();
        assert!(first.iter().all(|i| i.priced_id == PricedRef::Bound(priced.id.clone())));

        repo.replace_all(&priced.id, vec![unbound("c", 3.0)]).await.unwrap();
        let listed = repo.list(&priced.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].base_item_id, "c");
        assert_eq!(listed[0].id(), Some(format!("{}:c", priced.id)));
    }

    #[tokio::test]
    async fn list_by_ids_filters_on_base_item() {
        let (_priced_repo, repo, priced) = setup().await;
        repo.replace_all(&priced.id, vec![unbound("a", 1.0), unbound("b", 2.0), unbound("c", 3.0)])
            .await
            .unwrap();

        let picked = repo
            .list_by_ids(&priced.id, &["c".to_string(), "a".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        let ids: Vec<_> = picked.iter().map(|i| i.base_item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn finalized_version_is_frozen() {
        let (priced_repo, repo, mut priced) = setup().await;
        repo.replace_all(&priced.id, vec![unbound("a", 1.0)]).await.unwrap();

        priced.finalized_at = Some(Utc::now());
        priced_repo.update(priced.clone()).await.unwrap();

        let result = repo.replace_all(&priced.id, vec![unbound("b", 9.0)]).await;
        assert!(matches!(result, Err(DomainError::VersionFinalized { .. })));
        assert_eq!(repo.list(&priced.id).await.unwrap()[0].base_item_id, "a");
    }

    /// Memory adapter whose item writes take a while to land
    #[derive(Default)]
    struct SlowItemWrites {
        inner: MemoryAdapter,
    }

    #[async_trait]
    impl StorageAdapter for SlowItemWrites {
        fn name(&self) -> &'static str {
            "slow-items"
        }

        async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
            if key.starts_with("pricing:items:") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key).await
        }

        async fn keys(&self) -> StorageResult<Vec<String>> {
            self.inner.keys().await
        }

        async fn clear(&self) -> StorageResult<()> {
            self.inner.clear().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finalization_waits_for_an_in_flight_swap() {
        let storage = StorageManager::builder(Arc::new(SlowItemWrites::default()))
            .migrations(Arc::new(MigrationRegistry::new()))
            .build();
        storage.initialize().await.unwrap();

        let writes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = writes.clone();
        storage.on(EventFilter::Only(StorageEventKind::Set), move |event| {
            if let Some(key) = &event.key {
                seen.lock().unwrap().push(key.clone());
            }
            Ok(())
        });

        let repos = Arc::new(StorageRepositoryProvider::new(storage));
        let base = repos.bases().create(NewBase::active("T-1")).await.unwrap();
        let priced = repos
            .priced()
            .create(NewPriced {
                base_id: base.id,
                status: PricedStatus::Draft,
                totals: Totals::default(),
            })
            .await
            .unwrap();
        writes.lock().unwrap().clear();

        let swap = tokio::spawn({
            let repos = repos.clone();
            let id = priced.id.clone();
            async move { repos.priced_items().replace_all(&id, vec![unbound("a", 1.0)]).await }
        });
        tokio::task::yield_now().await;

        let mut finalized = priced.clone();
        finalized.status = PricedStatus::Approved;
        finalized.finalized_at = Some(Utc::now());
        repos.priced().update(finalized).await.unwrap();
        swap.await.unwrap().unwrap();

        assert_eq!(
            *writes.lock().unwrap(),
            vec![keys::priced_items(&priced.id), keys::priced(&priced.id)]
        );
        let late = repos.priced_items().replace_all(&priced.id, vec![]).await;
        assert!(matches!(late, Err(DomainError::VersionFinalized { .. })));
        assert_eq!(repos.priced_items().list(&priced.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_base_items_rejected() {
        let (_priced_repo, repo, priced) = setup().await;
        let result = repo
            .replace_all(&priced.id, vec![unbound("a", 1.0), unbound("a", 2.0)])
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let (_priced_repo, repo, _priced) = setup().await;
        let result = repo.replace_all("missing", vec![]).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
        assert!(repo.list("missing").await.unwrap().is_empty());
    }
}
