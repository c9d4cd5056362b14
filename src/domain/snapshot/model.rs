//! Snapshot entity

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable integrity record of a finalized priced version.
/// One-to-one with the priced version it seals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub priced_id: String,
    /// SHA-256 over canonical (items, totals)
    pub integrity_hash: String,
    /// SHA-256 over canonical totals alone
    pub totals_hash: String,
    /// SHA-256 over the engine configuration, when supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub meta: SnapshotMeta,
    pub created_at: DateTime<Utc>,
}

/// Free-form snapshot metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub engine_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SnapshotMeta {
    pub fn approved_by(approver: impl Into<String>) -> Self {
        Self {
            engine_version: crate::ENGINE_VERSION.to_string(),
            approved_by: Some(approver.into()),
            ..Self::default()
        }
    }
}
