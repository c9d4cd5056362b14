//! Application services

pub mod diff;
pub mod integrity;
pub mod pricing_engine;
pub mod pricing_service;

pub use diff::{DiffField, DiffService, FieldChange, ItemChange, PricingDiff};
pub use integrity::{canonical_json, integrity_hash, sha256_hex, totals_hash, IntegrityService};
pub use pricing_engine::{EngineConfig, PricingEngine};
pub use pricing_service::{PricedVersion, PricingService, RetentionPolicy};
