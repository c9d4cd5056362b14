//! Key-value storage substrate

mod cache;
mod events;
mod file;
mod manager;
mod memory;
mod migration;
mod traits;

pub use cache::{CacheConfig, CacheStats, Lookup, StorageCache};
pub use events::{
    EventFilter, ListenerError, ListenerId, StorageEvent, StorageEventBus, StorageEventKind,
    StorageEventSubscriber, StorageListener,
};
pub use file::FileAdapter;
pub use manager::{StorageConfig, StorageManager, StorageManagerBuilder, StorageStats};
pub use memory::MemoryAdapter;
pub use migration::{LegacyKeyResolver, MigrationRegistry};
pub use traits::{StorageAdapter, StorageResult};
