//! Repository traits for the domain layer
//!
//! Contains:
//! - `RepositoryProvider`: unified access to all per-aggregate repositories
//! - `DomainResult`: standard result type for domain operations

use super::boq::BaseRepository;
use super::pricing::{PricedItemRepository, PricedRepository};
use super::snapshot::SnapshotRepository;
use crate::shared::errors::DomainError;

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

// ── RepositoryProvider ──────────────────────────────────────────

/// Provides access to all domain repositories.
///
/// Consumers request only the repository they need:
///
/// ```ignore
/// async fn latest(repos: &dyn RepositoryProvider, base_id: &str) -> DomainResult<()> {
///     let priced = repos.priced().get_latest_by_base(base_id).await?;
///     let items = repos.priced_items().list(&priced.unwrap().id).await?;
///     Ok(())
/// }
/// ```
pub trait RepositoryProvider: Send + Sync {
    fn bases(&self) -> &dyn BaseRepository;
    fn priced(&self) -> &dyn PricedRepository;
    fn priced_items(&self) -> &dyn PricedItemRepository;
    fn snapshots(&self) -> &dyn SnapshotRepository;
}
