//! Snapshot aggregate

pub mod model;
pub mod repository;

pub use model::{Snapshot, SnapshotMeta};
pub use repository::SnapshotRepository;
