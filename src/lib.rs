//! # BOQ Pricing
//!
//! Pricing engine and versioned storage for bills of quantities.
//!
//! ## Architecture
//!
//! - **domain**: Bases, priced versions, snapshots and the repository traits
//! - **application**: Pricing engine, diffs, integrity hashing and the pricing workflow
//! - **infrastructure**: Key-value storage substrate and the repositories built on it
//! - **shared**: Errors and retry helpers
//! - **config**: TOML application configuration

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod shared;

/// Recorded in snapshot metadata at approval time
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::{default_config_path, default_data_dir, AppConfig, ConfigError};
pub use logging::init_tracing;

pub use application::{DiffService, EngineConfig, PricingEngine, PricingService, RetentionPolicy};
pub use domain::DomainError;
pub use infrastructure::{
    FileAdapter, MemoryAdapter, StorageAdapter, StorageConfig, StorageManager,
    StorageRepositoryProvider, TenderPricingResolver, TenderPricingStore,
};
