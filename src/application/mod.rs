pub mod services;

// Re-export key types for convenience
pub use services::{
    DiffField, DiffService, EngineConfig, FieldChange, IntegrityService, ItemChange,
    PricedVersion, PricingDiff, PricingEngine, PricingService, RetentionPolicy,
};
