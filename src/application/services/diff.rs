//! Cross-version diff of priced item sets
//!
//! Items are matched by `base_item_id`, the identity that survives priced
//! version boundaries. Tracked fields are compared with exact equality; no
//! floating-point tolerance is applied.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::PricedItem;

/// Field compared between two versions of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffField {
    TotalPrice,
    UnitPrice,
    Quantity,
}

impl DiffField {
    pub const TRACKED: [DiffField; 3] = [Self::TotalPrice, Self::UnitPrice, Self::Quantity];

    fn read(&self, item: &PricedItem) -> f64 {
        match self {
            Self::TotalPrice => item.total_price,
            Self::UnitPrice => item.unit_price,
            Self::Quantity => item.quantity,
        }
    }
}

impl std::fmt::Display for DiffField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TotalPrice => write!(f, "totalPrice"),
            Self::UnitPrice => write!(f, "unitPrice"),
            Self::Quantity => write!(f, "quantity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: DiffField,
    pub old: f64,
    pub new: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChange {
    pub item_id: String,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingDiff {
    /// In `new` order
    pub added: Vec<String>,
    /// In `old` order
    pub removed: Vec<String>,
    /// In `new` order
    pub changed: Vec<ItemChange>,
}

impl PricingDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffService;

impl DiffService {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, old_items: &[PricedItem], new_items: &[PricedItem]) -> PricingDiff {
        compute(old_items, new_items)
    }
}

/// Compare two priced item sets.
///
/// Duplicate `base_item_id`s within one side are reported once, using the
/// first occurrence.
pub fn compute(old_items: &[PricedItem], new_items: &[PricedItem]) -> PricingDiff {
    let old_by_id = first_by_id(old_items);
    let new_ids: HashSet<&str> = new_items.iter().map(|i| i.base_item_id.as_str()).collect();

    let mut diff = PricingDiff::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for item in new_items {
        let id = item.base_item_id.as_str();
        if !seen.insert(id) {
            continue;
        }
        match old_by_id.get(id) {
            None => diff.added.push(id.to_string()),
            Some(old) => {
                let changes: Vec<FieldChange> = DiffField::TRACKED
                    .iter()
                    .filter_map(|field| {
                        let (before, after) = (field.read(old), field.read(item));
                        (before != after).then_some(FieldChange {
                            field: *field,
                            old: before,
                            new: after,
                        })
                    })
                    .collect();
                if !changes.is_empty() {
                    diff.changed.push(ItemChange {
                        item_id: id.to_string(),
                        changes,
                    });
                }
            }
        }
    }

    let mut seen_removed: HashSet<&str> = HashSet::new();
    for item in old_items {
        let id = item.base_item_id.as_str();
        if !new_ids.contains(id) && seen_removed.insert(id) {
            diff.removed.push(id.to_string());
        }
    }

    diff
}

fn first_by_id(items: &[PricedItem]) -> HashMap<&str, &PricedItem> {
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        map.entry(item.base_item_id.as_str()).or_insert(item);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CostBreakdown, PricedRef};

    fn item(id: &str, total_price: f64) -> PricedItem {
        PricedItem {
            priced_id: PricedRef::Unbound,
            base_item_id: id.into(),
            line_no: 1,
            quantity: 1.0,
            breakdown: CostBreakdown::default(),
            unit_price: total_price,
            total_price,
            is_priced: total_price > 0.0,
        }
    }

    #[test]
    fn reference_scenario() {
        let mut old_i1 = item("i1", 150.0);
        old_i1.unit_price = 15.0;
        let mut new_i1 = item("i1", 180.0);
        new_i1.unit_price = 15.0;

        let diff = compute(&[old_i1], &[new_i1, item("i2", 50.0)]);

        assert_eq!(diff.added, vec!["i2".to_string()]);
        assert!(diff.removed.is_empty());
        assert_eq!(
            diff.changed,
            vec![ItemChange {
                item_id: "i1".into(),
                changes: vec![FieldChange {
                    field: DiffField::TotalPrice,
                    old: 150.0,
                    new: 180.0,
                }],
            }]
        );
    }

    #[test]
    fn unchanged_items_are_omitted() {
        let diff = compute(&[item("i1", 10.0)], &[item("i1", 10.0)]);
        assert!(diff.is_empty());
    }

    #[test]
    fn removed_items_follow_old_order() {
        let diff = compute(&[item("b", 1.0), item("a", 1.0), item("c", 1.0)], &[item("c", 1.0)]);
        assert_eq!(diff.removed, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn changed_follows_new_order() {
        let old = vec![item("a", 1.0), item("b", 1.0)];
        let new = vec![item("b", 2.0), item("a", 2.0)];
        let ids: Vec<_> = compute(&old, &new)
            .changed
            .into_iter()
            .map(|c| c.item_id)
            .collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn strict_equality_reports_tiny_differences() {
        let diff = compute(&[item("i1", 0.1 + 0.2)], &[item("i1", 0.3)]);
        assert_eq!(diff.changed.len(), 1);
    }

    #[test]
    fn field_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(DiffField::TotalPrice).unwrap(),
            serde_json::json!("totalPrice")
        );
        assert_eq!(DiffField::UnitPrice.to_string(), "unitPrice");
    }
}
