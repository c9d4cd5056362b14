//! Storage implementation of BaseRepository

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::try_join_all;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use super::keys;
use super::locks::KeyedLocks;
use crate::domain::{Base, BaseItem, BaseRepository, DomainError, DomainResult, NewBase, NewBaseItem};
use crate::infrastructure::storage::StorageManager;

pub struct StorageBaseRepository {
    storage: StorageManager,
    tender_locks: KeyedLocks,
    item_locks: KeyedLocks,
}

impl StorageBaseRepository {
    pub fn new(storage: StorageManager) -> Self {
        Self {
            storage,
            tender_locks: KeyedLocks::default(),
            item_locks: KeyedLocks::default(),
        }
    }

    async fn save(&self, base: &Base) -> DomainResult<()> {
        self.storage.set_as(&keys::base(&base.id), base).await?;
        Ok(())
    }
}

// ── Validation helpers ──────────────────────────────────────────

fn validate_items(items: &[NewBaseItem]) -> DomainResult<()> {
    let mut line_numbers = HashSet::new();
    let mut ids = HashSet::new();

    for item in items {
        item.validate().map_err(|e| {
            DomainError::Validation(format!("item at line {}: {}", item.line_no, e))
        })?;
        if !item.quantity.is_finite() {
            return Err(DomainError::Validation(format!(
                "item at line {}: quantity must be finite",
                item.line_no
            )));
        }
        if !line_numbers.insert(item.line_no) {
            return Err(DomainError::Validation(format!(
                "duplicate line number {}",
                item.line_no
            )));
        }
        if let Some(id) = &item.id {
            if !ids.insert(id.as_str()) {
                return Err(DomainError::Validation(format!("duplicate item id {id}")));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl BaseRepository for StorageBaseRepository {
    async fn get_by_id(&self, id: &str) -> DomainResult<Option<Base>> {
        Ok(self.storage.get_as(&keys::base(id)).await?)
    }

    async fn list_by_tender(&self, tender_id: &str) -> DomainResult<Vec<Base>> {
        let ids: Vec<String> = self
            .storage
            .get_as(&keys::tender_bases(tender_id))
            .await?
            .unwrap_or_default();

        let loaded = try_join_all(ids.iter().map(|id| self.get_by_id(id))).await?;
        let mut bases: Vec<Base> = loaded.into_iter().flatten().collect();
        bases.sort_by_key(|b| b.version);
        Ok(bases)
    }

    async fn create(&self, new_base: NewBase) -> DomainResult<Base> {
        if new_base.tender_id.trim().is_empty() {
            return Err(DomainError::Validation("tender id must not be empty".into()));
        }

        let _guard = self.tender_locks.lock(&new_base.tender_id).await;
        let existing = self.list_by_tender(&new_base.tender_id).await?;
        let version = existing.iter().map(|b| b.version).max().unwrap_or(0) + 1;

        let base = Base {
            id: Uuid::new_v4().to_string(),
            tender_id: new_base.tender_id.clone(),
            version,
            is_active: new_base.is_active,
            created_at: Utc::now(),
        };

        if base.is_active {
            for mut previous in existing.into_iter().filter(|b| b.is_active) {
                previous.is_active = false;
                self.save(&previous).await?;
                debug!(base_id = %previous.id, "Base deactivated");
            }
        }

        self.save(&base).await?;

        let index_key = keys::tender_bases(&base.tender_id);
        let mut ids: Vec<String> = self.storage.get_as(&index_key).await?.unwrap_or_default();
        ids.push(base.id.clone());
        self.storage.set_as(&index_key, &ids).await?;

        info!(
            tender_id = %base.tender_id,
            base_id = %base.id,
            version = base.version,
            active = base.is_active,
            "Base created"
        );
        Ok(base)
    }

    async fn create_items(&self, base_id: &str, items: Vec<NewBaseItem>) -> DomainResult<Vec<BaseItem>> {
        let _guard = self.item_locks.lock(base_id).await;

        if self.get_by_id(base_id).await?.is_none() {
            return Err(DomainError::not_found("Base", "id", base_id));
        }
        let items_key = keys::base_items(base_id);
        if self.storage.has(&items_key).await? {
            return Err(DomainError::Validation(format!(
                "items of base {base_id} were already created"
            )));
        }
        validate_items(&items)?;

        let mut created: Vec<BaseItem> = items
            .into_iter()
            .map(|item| BaseItem {
                id: item.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                base_id: base_id.to_string(),
                line_no: item.line_no,
                description: item.description,
                unit: item.unit,
                quantity: item.quantity,
            })
            .collect();
        created.sort_by_key(|i| i.line_no);

        self.storage.set_as(&items_key, &created).await?;
        info!(base_id, count = created.len(), "Base items created");
        Ok(created)
    }

    async fn list_items(&self, base_id: &str) -> DomainResult<Vec<BaseItem>> {
        Ok(self
            .storage
            .get_as(&keys::base_items(base_id))
            .await?
            .unwrap_or_default())
    }
}
