//! Tender pricing records and their legacy layout
//!
//! Current records live under `tender-pricing:<tenderId>`. Older installs
//! stored `tender-pricing-<tenderId>` with the shape
//! `{ pricing: [[id, data]] | {id: data}, defaultPercentages?, lastUpdated?, version? }`.
//! [`TenderPricingResolver`] validates those payloads and converts them on
//! first read; nothing past this module sees raw legacy JSON.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::keys::{self, TENDER_PRICING_PREFIX};
use super::locks::KeyedLocks;
use crate::domain::{DefaultPercentages, DomainError, DomainResult, ItemResources, TenderPricing};
use crate::infrastructure::storage::{LegacyKeyResolver, StorageManager};

pub struct TenderPricingStore {
    storage: StorageManager,
    defaults: DefaultPercentages,
    locks: KeyedLocks,
}

impl TenderPricingStore {
    /// `defaults` seed records of tenders that have never been saved
    pub fn new(storage: StorageManager, defaults: DefaultPercentages) -> Self {
        Self {
            storage,
            defaults,
            locks: KeyedLocks::default(),
        }
    }

    pub async fn load(&self, tender_id: &str) -> DomainResult<TenderPricing> {
        let stored: Option<TenderPricing> = self.storage.get_as(&keys::tender_pricing(tender_id)).await?;
        Ok(stored.unwrap_or_else(|| {
            let mut fresh = TenderPricing::new(tender_id);
            fresh.default_percentages = self.defaults;
            fresh
        }))
    }

    /// Persist a record; bumps `version` past the stored one and stamps
    /// `last_saved_at`.
    pub async fn save(&self, mut record: TenderPricing) -> DomainResult<TenderPricing> {
        if record.tender_id.trim().is_empty() {
            return Err(DomainError::Validation("tender id must not be empty".into()));
        }
        validate_percentages(&record.default_percentages)?;

        let key = keys::tender_pricing(&record.tender_id);
        let _guard = self.locks.lock(&record.tender_id).await;

        let stored_version = self
            .storage
            .get_as::<TenderPricing>(&key)
            .await?
            .map(|r| r.version)
            .unwrap_or(0);
        record.version = stored_version.max(record.version) + 1;
        record.last_saved_at = Some(Utc::now());

        self.storage.set_as(&key, &record).await?;
        info!(
            tender_id = %record.tender_id,
            version = record.version,
            entries = record.pricing_entries.len(),
            "Tender pricing saved"
        );
        Ok(record)
    }

    pub async fn default_percentages(&self, tender_id: &str) -> DomainResult<DefaultPercentages> {
        Ok(self.load(tender_id).await?.default_percentages)
    }

    pub async fn update_default_percentages(
        &self,
        tender_id: &str,
        percentages: DefaultPercentages,
    ) -> DomainResult<TenderPricing> {
        validate_percentages(&percentages)?;
        let mut record = self.load(tender_id).await?;
        record.default_percentages = percentages;
        record.last_updated = Some(Utc::now());
        self.save(record).await
    }
}

fn validate_percentages(p: &DefaultPercentages) -> DomainResult<()> {
    for (name, value) in [
        ("administrative", p.administrative),
        ("operational", p.operational),
        ("profit", p.profit),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(DomainError::Validation(format!(
                "{name} percentage must be a non-negative number, got {value}"
            )));
        }
    }
    Ok(())
}

// ── Legacy layout ──────────────────────────────────────────────

/// Maps `tender-pricing:<id>` to `tender-pricing-<id>` and upgrades the payload
#[derive(Debug, Clone, Copy, Default)]
pub struct TenderPricingResolver;

impl LegacyKeyResolver for TenderPricingResolver {
    fn legacy_keys(&self, current_key: &str) -> Vec<String> {
        current_key
            .strip_prefix(TENDER_PRICING_PREFIX)
            .filter(|tender_id| !tender_id.is_empty())
            .map(|tender_id| vec![keys::legacy_tender_pricing(tender_id)])
            .unwrap_or_default()
    }

    fn normalize(&self, current_key: &str, _legacy_key: &str, raw: Value) -> Result<Value, String> {
        let tender_id = current_key
            .strip_prefix(TENDER_PRICING_PREFIX)
            .ok_or_else(|| format!("{current_key} is not a tender pricing key"))?;
        let record = normalize_legacy(tender_id, raw)?;
        serde_json::to_value(record).map_err(|e| e.to_string())
    }
}

/// Validate a legacy payload and convert it to the current record
pub fn normalize_legacy(tender_id: &str, raw: Value) -> Result<TenderPricing, String> {
    let Value::Object(mut payload) = raw else {
        return Err("payload is not an object".into());
    };

    let pricing_entries = match payload.remove("pricing") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(rows)) => rows
            .into_iter()
            .filter_map(pair_entry)
            .map(|(id, data)| resources_entry(id, data))
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(id, data)| resources_entry(id, data))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(format!("pricing must be a list or a map, got {other}")),
    };

    let default_percentages = match payload.get("defaultPercentages") {
        Some(Value::Object(map)) => percentages_from(map),
        _ => DefaultPercentages::default(),
    };

    let last_updated = payload
        .get("lastUpdated")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let version = payload
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(1);

    Ok(TenderPricing {
        tender_id: tender_id.to_string(),
        pricing_entries,
        default_percentages,
        last_updated: Some(last_updated),
        last_saved_at: None,
        version,
    })
}

/// Splits a `[id, data]` row; rows of any other shape carry no item and are skipped
fn pair_entry(row: Value) -> Option<(String, Value)> {
    let Value::Array(mut pair) = row else {
        return None;
    };
    if pair.len() != 2 {
        return None;
    }
    let data = pair.pop()?;
    match pair.pop()? {
        Value::String(id) => Some((id, data)),
        _ => None,
    }
}

const RESOURCE_GROUPS: [&str; 4] = ["materials", "labor", "equipment", "subcontractors"];
const ROW_NUMBERS: [&str; 3] = ["quantity", "price", "total"];
const PERCENTAGE_FIELDS: [&str; 3] = ["administrative", "operational", "profit"];

/// Reads one item's resources. Numeric fields stored as text are coerced
/// first; an entry that still does not read fails the whole payload so the
/// legacy key is kept for a later attempt.
fn resources_entry(id: String, mut data: Value) -> Result<(String, ItemResources), String> {
    if let Value::Object(fields) = &mut data {
        for group in RESOURCE_GROUPS {
            if let Some(Value::Array(rows)) = fields.get_mut(group) {
                for row in rows.iter_mut().filter_map(Value::as_object_mut) {
                    coerce_numbers(row, &ROW_NUMBERS);
                }
            }
        }
        if let Some(Value::Object(overrides)) = fields.get_mut("additionalPercentages") {
            coerce_numbers(overrides, &PERCENTAGE_FIELDS);
        }
    }

    match serde_json::from_value::<ItemResources>(data) {
        Ok(resources) => Ok((id, resources)),
        Err(e) => {
            warn!(base_item_id = %id, error = %e, "Unreadable legacy pricing entry");
            Err(format!("pricing entry {id} is unreadable: {e}"))
        }
    }
}

/// Numeric text becomes a number and blank text becomes null.
/// Anything else is left for deserialization to judge.
fn coerce_numbers(fields: &mut Map<String, Value>, names: &[&str]) {
    for name in names {
        let Some(value) = fields.get_mut(*name) else {
            continue;
        };
        let Value::String(text) = value else {
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            *value = Value::Null;
        } else if let Some(number) = text
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .and_then(serde_json::Number::from_f64)
        {
            *value = Value::Number(number);
        }
    }
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn percentages_from(map: &Map<String, Value>) -> DefaultPercentages {
    let read = |name: &str| {
        map.get(name).and_then(number_from).unwrap_or(0.0)
    };
    DefaultPercentages {
        administrative: read("administrative"),
        operational: read("operational"),
        profit: read("profit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceRow;
    use crate::infrastructure::storage::{MemoryAdapter, MigrationRegistry, StorageAdapter};
    use serde_json::json;
    use std::sync::Arc;

    async fn store_over(adapter: Arc<MemoryAdapter>) -> TenderPricingStore {
        let storage = StorageManager::builder(adapter)
            .migrations(Arc::new(MigrationRegistry::new()))
            .legacy_resolver(Arc::new(TenderPricingResolver))
            .build();
        storage.initialize().await.unwrap();
        TenderPricingStore::new(storage, DefaultPercentages::default())
    }

    #[test]
    fn normalizes_pair_list_form() {
        let raw = json!({
            "pricing": [
                ["i1", {"materials": [{"name": "cement", "quantity": 2, "price": 50}]}],
                ["broken"],
                [7, {}],
            ],
            "defaultPercentages": {"administrative": 8, "operational": 4},
            "lastUpdated": "2024-03-01T10:00:00.000Z",
        });

        let record = normalize_legacy("T-1", raw).unwrap();
        assert_eq!(record.pricing_entries.len(), 1);
        assert_eq!(record.pricing_entries[0].0, "i1");
        assert_eq!(record.pricing_entries[0].1.materials[0].line_total(), 100.0);
        assert_eq!(record.default_percentages.administrative, 8.0);
        assert_eq!(record.default_percentages.profit, 0.0);
        assert_eq!(record.version, 1);
        assert_eq!(
            record.last_updated.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );
    }

    #[test]
    fn normalizes_map_form() {
        let raw = json!({"pricing": {"i2": {"labor": []}, "i1": {}}, "version": 4});
        let record = normalize_legacy("T-1", raw).unwrap();

        let ids: Vec<_> = record.pricing_entries.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2"]);
        assert_eq!(record.version, 4);
        assert_eq!(record.default_percentages, DefaultPercentages::default());
    }

    #[test]
    fn numeric_text_is_read_as_numbers() {
        let raw = json!({
            "pricing": [
                ["i1", {
                    "materials": [{"name": "rebar", "quantity": "10", "price": " 50 "}],
                    "labor": [{"total": ""}],
                    "additionalPercentages": {"profit": "12.5"},
                }],
            ],
            "defaultPercentages": {"administrative": "8"},
        });

        let record = normalize_legacy("T-1", raw).unwrap();
        let resources = &record.pricing_entries[0].1;
        assert_eq!(resources.materials[0].line_total(), 500.0);
        assert_eq!(resources.labor[0].total, None);
        assert_eq!(
            resources.additional_percentages.and_then(|p| p.profit),
            Some(12.5)
        );
        assert_eq!(record.default_percentages.administrative, 8.0);
    }

    #[test]
    fn unreadable_entry_fails_the_payload() {
        let raw = json!({
            "pricing": [
                ["i1", {"materials": [{"quantity": 1, "price": 10}]}],
                ["i2", {"materials": [{"quantity": "ten", "price": 10}]}],
            ],
        });
        assert!(normalize_legacy("T-1", raw).is_err());

        let raw = json!({"pricing": {"i1": {"labor": "not a list"}}});
        assert!(normalize_legacy("T-1", raw).is_err());
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(normalize_legacy("T-1", json!([1, 2])).is_err());
        assert!(normalize_legacy("T-1", json!({"pricing": 42})).is_err());
    }

    #[test]
    fn resolver_only_maps_tender_keys() {
        let resolver = TenderPricingResolver;
        assert_eq!(
            resolver.legacy_keys("tender-pricing:T-9"),
            vec!["tender-pricing-T-9".to_string()]
        );
        assert!(resolver.legacy_keys("pricing:priced:x").is_empty());
        assert!(resolver.legacy_keys("tender-pricing:").is_empty());
    }

    #[tokio::test]
    async fn legacy_record_migrates_on_first_load() {
        let adapter = Arc::new(MemoryAdapter::with_entries([(
            "tender-pricing-T-1".to_string(),
            json!({"pricing": [["i1", {"labor": [{"total": 40}]}]]}),
        )]));
        let store = store_over(adapter.clone()).await;

        let record = store.load("T-1").await.unwrap();
        assert_eq!(record.tender_id, "T-1");
        assert_eq!(record.cost_inputs()[0].labor_cost, 40.0);

        let again = store.load("T-1").await.unwrap();
        assert_eq!(again, record);
        assert_eq!(adapter.get("tender-pricing-T-1").await.unwrap(), None);
        assert!(adapter.get("tender-pricing:T-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_legacy_record_is_left_alone() {
        let adapter = Arc::new(MemoryAdapter::with_entries([(
            "tender-pricing-T-1".to_string(),
            json!("not a record"),
        )]));
        let store = store_over(adapter.clone()).await;

        let record = store.load("T-1").await.unwrap();
        assert!(record.pricing_entries.is_empty());
        assert_eq!(record.version, 0);
        assert!(adapter.get("tender-pricing-T-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn legacy_record_with_unreadable_entry_is_kept() {
        let payload = json!({
            "pricing": [
                ["i1", {"labor": [{"total": 40}]}],
                ["i2", {"equipment": [{"quantity": "two", "price": 300}]}],
            ],
        });
        let adapter = Arc::new(MemoryAdapter::with_entries([(
            "tender-pricing-T-1".to_string(),
            payload.clone(),
        )]));
        let store = store_over(adapter.clone()).await;

        let record = store.load("T-1").await.unwrap();
        assert!(record.pricing_entries.is_empty());
        assert_eq!(
            adapter.get("tender-pricing-T-1").await.unwrap(),
            Some(payload)
        );
        assert_eq!(adapter.get("tender-pricing:T-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_bumps_version() {
        let store = store_over(Arc::new(MemoryAdapter::new())).await;

        let mut record = store.load("T-1").await.unwrap();
        record.upsert(
            "i1",
            ItemResources {
                equipment: vec![ResourceRow::priced("excavator", 2.0, 300.0)],
                ..ItemResources::default()
            },
        );
        let first = store.save(record).await.unwrap();
        assert_eq!(first.version, 1);
        assert!(first.last_saved_at.is_some());

        let second = store.save(first.clone()).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(store.load("T-1").await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn default_percentages_round_trip() {
        let store = store_over(Arc::new(MemoryAdapter::new())).await;
        assert_eq!(
            store.default_percentages("T-1").await.unwrap(),
            DefaultPercentages::default()
        );

        let updated = DefaultPercentages {
            administrative: 7.5,
            operational: 2.5,
            profit: 12.0,
        };
        store.update_default_percentages("T-1", updated).await.unwrap();
        assert_eq!(store.default_percentages("T-1").await.unwrap(), updated);

        let negative = DefaultPercentages {
            profit: -1.0,
            ..updated
        };
        assert!(matches!(
            store.update_default_percentages("T-1", negative).await,
            Err(DomainError::Validation(_))
        ));
    }
}
