//! Base repository interface

use async_trait::async_trait;

use super::model::{Base, BaseItem, NewBase, NewBaseItem};
use crate::domain::DomainResult;

/// Persistence seam for quantity baselines.
///
/// Implementations own the "one active base per tender" policy: creating an
/// active base deactivates every earlier base of the same tender.
#[async_trait]
pub trait BaseRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> DomainResult<Option<Base>>;
    /// Bases of a tender ordered by ascending version
    async fn list_by_tender(&self, tender_id: &str) -> DomainResult<Vec<Base>>;
    async fn create(&self, base: NewBase) -> DomainResult<Base>;
    /// Items can be created exactly once per base.
    async fn create_items(&self, base_id: &str, items: Vec<NewBaseItem>) -> DomainResult<Vec<BaseItem>>;
    /// Items ordered by line number
    async fn list_items(&self, base_id: &str) -> DomainResult<Vec<BaseItem>>;
}
