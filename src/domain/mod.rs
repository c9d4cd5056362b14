pub mod boq;
pub mod pricing;
pub mod repositories;
pub mod snapshot;

// Re-export commonly used types
pub use boq::{Base, BaseItem, BaseRepository, NewBase, NewBaseItem};
pub use pricing::{
    Completion, CostBreakdown, CostInput, DefaultPercentages, ItemResources, NewPriced,
    PercentageOverrides, Priced, PricedItem, PricedItemRepository, PricedRef, PricedRepository,
    PricedStatus, ResourceRow, TenderPricing, Totals,
};
pub use repositories::{DomainResult, RepositoryProvider};
pub use snapshot::{Snapshot, SnapshotMeta, SnapshotRepository};

// Re-export DomainError from shared for convenience
pub use crate::shared::errors::DomainError;
