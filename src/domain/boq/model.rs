//! Quantity baseline entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Immutable quantity baseline for a tender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base {
    pub id: String,
    /// Opaque foreign key, never validated here
    pub tender_id: String,
    /// Per-tender sequence, starting at 1
    pub version: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new base
#[derive(Debug, Clone)]
pub struct NewBase {
    pub tender_id: String,
    pub is_active: bool,
}

impl NewBase {
    pub fn active(tender_id: impl Into<String>) -> Self {
        Self {
            tender_id: tender_id.into(),
            is_active: true,
        }
    }
}

/// A BOQ line item. Created once together with its base; corrections
/// produce a new base version instead of mutating the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseItem {
    pub id: String,
    pub base_id: String,
    pub line_no: u32,
    pub description: String,
    pub unit: String,
    pub quantity: f64,
}

/// Input for a base line item
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBaseItem {
    /// Caller-supplied stable id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub line_no: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[validate(range(min = 0.0))]
    pub quantity: f64,
}

impl NewBaseItem {
    pub fn new(line_no: u32, quantity: f64) -> Self {
        Self {
            id: None,
            line_no,
            description: String::new(),
            unit: String::new(),
            quantity,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>, unit: impl Into<String>) -> Self {
        self.description = description.into();
        self.unit = unit.into();
        self
    }
}
