//! Pricing aggregate
//!
//! Contains cost inputs, priced items, priced versions and their totals.

pub mod model;
pub mod repository;
pub mod tender;

pub use model::{
    Completion, CostBreakdown, CostInput, DefaultPercentages, ItemResources, NewPriced,
    PercentageOverrides, Priced, PricedItem, PricedRef, PricedStatus, ResourceRow, Totals,
};
pub use repository::{PricedItemRepository, PricedRepository};
pub use tender::TenderPricing;
