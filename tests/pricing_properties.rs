//! Property tests for the pure pricing pipeline: engine, diff and hashing.

use std::collections::BTreeMap;

use proptest::prelude::*;

use boq_pricing::application::services::{diff, integrity_hash};
use boq_pricing::domain::{BaseItem, CostInput, PricedItem, PricedRef};
use boq_pricing::{EngineConfig, PricingEngine};

fn amount() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), 0.0f64..1_000_000.0]
}

fn base_items() -> impl Strategy<Value = Vec<BaseItem>> {
    prop::collection::btree_map(0u32..40, prop_oneof![Just(0.0), 0.001f64..10_000.0], 0..20).prop_map(
        |rows: BTreeMap<u32, f64>| {
            rows.into_iter()
                .map(|(n, quantity)| BaseItem {
                    id: format!("item-{n}"),
                    base_id: "base-1".to_string(),
                    line_no: n + 1,
                    description: format!("Line {n}"),
                    unit: "m3".to_string(),
                    quantity,
                })
                .collect()
        },
    )
}

fn cost_input(ids: Vec<String>) -> impl Strategy<Value = CostInput> {
    (
        prop::sample::select(ids),
        [amount(), amount(), amount(), amount(), amount(), amount(), amount()],
    )
        .prop_map(|(id, [m, l, e, s, a, o, p])| CostInput {
            base_item_id: id,
            materials_cost: m,
            labor_cost: l,
            equipment_cost: e,
            subcontract_cost: s,
            admin_cost: a,
            operational_cost: o,
            profit_cost: p,
        })
}

/// Base items plus inputs that mostly reference them, with a few strays
fn priced_scenario() -> impl Strategy<Value = (Vec<BaseItem>, Vec<CostInput>)> {
    base_items().prop_flat_map(|items| {
        let mut ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        ids.push("not-in-base".to_string());
        let inputs = prop::collection::vec(cost_input(ids), 0..25);
        (Just(items), inputs)
    })
}

fn engine() -> PricingEngine {
    PricingEngine::new(EngineConfig::default())
}

/// Priced items keyed by a small id space so old and new sets overlap
fn priced_items() -> impl Strategy<Value = Vec<PricedItem>> {
    prop::collection::btree_map(0u32..15, (0u8..3, 0u8..3), 0..12).prop_map(|rows| {
        rows.into_iter()
            .map(|(n, (qty, price))| PricedItem {
                priced_id: PricedRef::Unbound,
                base_item_id: format!("item-{n}"),
                line_no: n + 1,
                quantity: f64::from(qty),
                breakdown: Default::default(),
                unit_price: f64::from(price),
                total_price: f64::from(price) * f64::from(qty),
                is_priced: price > 0 && qty > 0,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn enrich_is_deterministic((items, inputs) in priced_scenario()) {
        let engine = engine();
        let first = engine.enrich(&items, &inputs);
        let second = engine.enrich(&items, &inputs);
        prop_assert_eq!(&first, &second);

        let totals = engine.aggregate_totals(&first);
        prop_assert_eq!(
            integrity_hash(&first, &totals).unwrap(),
            integrity_hash(&second, &engine.aggregate_totals(&second)).unwrap()
        );
    }

    #[test]
    fn every_base_item_is_priced_once_in_order((items, inputs) in priced_scenario()) {
        let priced = engine().enrich(&items, &inputs);
        prop_assert_eq!(priced.len(), items.len());
        for (item, p) in items.iter().zip(&priced) {
            prop_assert_eq!(&p.base_item_id, &item.id);
            prop_assert_eq!(p.line_no, item.line_no);
            prop_assert_eq!(&p.priced_id, &PricedRef::Unbound);
        }
    }

    #[test]
    fn cost_identity_holds((items, inputs) in priced_scenario()) {
        for p in engine().enrich(&items, &inputs) {
            prop_assert_eq!(p.total_price, p.breakdown.subtotal_cost());
            prop_assert_eq!(p.is_priced, p.total_price > 0.0);
            prop_assert!(p.unit_price.is_finite());
            if p.quantity > 0.0 {
                let rebuilt = p.unit_price * p.quantity;
                prop_assert!((rebuilt - p.total_price).abs() <= 1e-6 * p.total_price.max(1.0));
            } else {
                prop_assert_eq!(p.unit_price, 0.0);
            }
        }
    }

    #[test]
    fn totals_are_finite_and_consistent((items, inputs) in priced_scenario(), vat in 0.0f64..=1.0) {
        let engine = PricingEngine::new(EngineConfig { vat_rate: vat, ..EngineConfig::default() });
        let totals = engine.aggregate_totals(&engine.enrich(&items, &inputs));

        for value in [
            totals.total_value,
            totals.vat_amount,
            totals.total_with_vat,
            totals.profit_pct,
            totals.admin_operational_pct,
        ] {
            prop_assert!(value.is_finite());
        }
        prop_assert_eq!(totals.total_with_vat, totals.total_value + totals.vat_amount);
        if totals.total_value == 0.0 {
            prop_assert_eq!(totals.profit_pct, 0.0);
            prop_assert_eq!(totals.admin_operational_pct, 0.0);
        }
    }

    #[test]
    fn integrity_hash_ignores_item_order((items, inputs) in priced_scenario()) {
        let engine = engine();
        let priced = engine.enrich(&items, &inputs);
        let totals = engine.aggregate_totals(&priced);

        let mut reversed = priced.clone();
        reversed.reverse();
        prop_assert_eq!(
            integrity_hash(&priced, &totals).unwrap(),
            integrity_hash(&reversed, &totals).unwrap()
        );
    }

    #[test]
    fn diff_against_itself_is_empty(items in priced_items()) {
        prop_assert!(diff::compute(&items, &items).is_empty());
    }

    #[test]
    fn diff_is_symmetric(old in priced_items(), new in priced_items()) {
        let forward = diff::compute(&old, &new);
        let backward = diff::compute(&new, &old);

        let mut added = forward.added.clone();
        let mut removed = backward.removed.clone();
        added.sort();
        removed.sort();
        prop_assert_eq!(added, removed);

        let mut forward_changed: Vec<_> = forward.changed.iter().map(|c| c.item_id.clone()).collect();
        let mut backward_changed: Vec<_> = backward.changed.iter().map(|c| c.item_id.clone()).collect();
        forward_changed.sort();
        backward_changed.sort();
        prop_assert_eq!(forward_changed, backward_changed);
    }

    #[test]
    fn diff_covers_every_id(old in priced_items(), new in priced_items()) {
        let result = diff::compute(&old, &new);
        let old_ids: Vec<&str> = old.iter().map(|i| i.base_item_id.as_str()).collect();
        let new_ids: Vec<&str> = new.iter().map(|i| i.base_item_id.as_str()).collect();

        for id in &new_ids {
            prop_assert_eq!(result.added.iter().any(|a| a.as_str() == *id), !old_ids.contains(id));
        }
        for id in &old_ids {
            prop_assert_eq!(result.removed.iter().any(|r| r.as_str() == *id), !new_ids.contains(id));
        }

        // Changed items are exactly the shared ones whose tracked fields differ
        for n in &new {
            let Some(o) = old.iter().find(|o| o.base_item_id == n.base_item_id) else {
                continue;
            };
            let differs = o.quantity != n.quantity
                || o.unit_price != n.unit_price
                || o.total_price != n.total_price;
            prop_assert_eq!(
                result.changed.iter().any(|c| c.item_id == n.base_item_id),
                differs
            );
        }
    }
}
