//! Snapshot repository interface

use async_trait::async_trait;

use super::model::Snapshot;
use crate::domain::DomainResult;

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Fails with `AlreadyFinalized` if the priced version already has one.
    async fn create(&self, snapshot: Snapshot) -> DomainResult<Snapshot>;
    async fn get_by_priced(&self, priced_id: &str) -> DomainResult<Option<Snapshot>>;
}
