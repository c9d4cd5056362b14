//! Priced version & priced item repository interfaces

use async_trait::async_trait;

use super::model::{NewPriced, Priced, PricedItem};
use crate::domain::DomainResult;

#[async_trait]
pub trait PricedRepository: Send + Sync {
    /// Assigns `version = max(existing) + 1` for the base. Concurrent creates
    /// for the same base are serialized and never share a version.
    async fn create(&self, priced: NewPriced) -> DomainResult<Priced>;
    /// Fails with `VersionFinalized` when the stored record is finalized.
    async fn update(&self, priced: Priced) -> DomainResult<Priced>;
    async fn get_by_id(&self, id: &str) -> DomainResult<Option<Priced>>;
    /// Highest version of an active base; `None` for inactive bases.
    async fn get_latest_by_base(&self, base_id: &str) -> DomainResult<Option<Priced>>;
    async fn get_version(&self, base_id: &str, version: u32) -> DomainResult<Option<Priced>>;
    /// Versions in ascending order
    async fn list_versions(&self, base_id: &str) -> DomainResult<Vec<Priced>>;
    /// Removes a non-finalized version together with its items.
    async fn delete(&self, id: &str) -> DomainResult<()>;
}

#[async_trait]
pub trait PricedItemRepository: Send + Sync {
    /// Atomically swaps the item set of a priced version. Items are bound to
    /// `priced_id` on the way in. Readers see the old or the new set, never
    /// a mix.
    async fn replace_all(&self, priced_id: &str, items: Vec<PricedItem>) -> DomainResult<Vec<PricedItem>>;
    async fn list(&self, priced_id: &str) -> DomainResult<Vec<PricedItem>>;
    /// Items whose `base_item_id` is in `base_item_ids`
    async fn list_by_ids(&self, priced_id: &str, base_item_ids: &[String]) -> DomainResult<Vec<PricedItem>>;
}
