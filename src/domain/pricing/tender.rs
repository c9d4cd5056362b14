//! Per-tender resource pricing as entered by estimators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{CostInput, DefaultPercentages, ItemResources};

/// Working pricing record of one tender.
///
/// `pricing_entries` keeps insertion order and serializes as
/// `[[baseItemId, resources], ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderPricing {
    pub tender_id: String,
    #[serde(default)]
    pub pricing_entries: Vec<(String, ItemResources)>,
    #[serde(default)]
    pub default_percentages: DefaultPercentages,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Bumped on every save
    #[serde(default)]
    pub version: u32,
}

impl TenderPricing {
    pub fn new(tender_id: impl Into<String>) -> Self {
        Self {
            tender_id: tender_id.into(),
            pricing_entries: Vec::new(),
            default_percentages: DefaultPercentages::default(),
            last_updated: None,
            last_saved_at: None,
            version: 0,
        }
    }

    pub fn resources(&self, base_item_id: &str) -> Option<&ItemResources> {
        self.pricing_entries
            .iter()
            .find(|(id, _)| id == base_item_id)
            .map(|(_, r)| r)
    }

    /// Insert or replace the resources of one item
    pub fn upsert(&mut self, base_item_id: impl Into<String>, resources: ItemResources) {
        let base_item_id = base_item_id.into();
        match self.pricing_entries.iter_mut().find(|(id, _)| *id == base_item_id) {
            Some((_, existing)) => *existing = resources,
            None => self.pricing_entries.push((base_item_id, resources)),
        }
        self.last_updated = Some(Utc::now());
    }

    pub fn remove(&mut self, base_item_id: &str) -> Option<ItemResources> {
        let index = self.pricing_entries.iter().position(|(id, _)| id == base_item_id)?;
        self.last_updated = Some(Utc::now());
        Some(self.pricing_entries.remove(index).1)
    }

    /// Engine inputs for every entry, using the tender defaults where an item
    /// has no override
    pub fn cost_inputs(&self) -> Vec<CostInput> {
        self.pricing_entries
            .iter()
            .map(|(id, resources)| CostInput::from_resources(id.clone(), resources, &self.default_percentages))
            .collect()
    }
}
