//! Infrastructure layer - external concerns

pub mod repositories;
pub mod storage;

pub use repositories::{StorageRepositoryProvider, TenderPricingResolver, TenderPricingStore};
pub use storage::{FileAdapter, MemoryAdapter, StorageAdapter, StorageConfig, StorageManager};
