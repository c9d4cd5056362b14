//! Pricing engine
//!
//! Pure computation: base items + cost inputs → priced items → totals.
//! Every function here is total. Numeric guards resolve to `0`, never to
//! NaN or infinity, because diffing and integrity hashing downstream depend
//! on identical output for identical input.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    BaseItem, Completion, CostBreakdown, CostInput, DefaultPercentages, PricedItem, PricedRef,
    Totals,
};

/// Engine parameters taken from configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Fraction, e.g. `0.15` for 15 %
    pub vat_rate: f64,
    pub default_percentages: DefaultPercentages,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vat_rate: 0.15,
            default_percentages: DefaultPercentages::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: EngineConfig,
}

impl PricingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Price every base item.
    ///
    /// Items without a matching input are priced at zero. When several inputs
    /// share a `base_item_id` the last one wins. Output order follows
    /// `base_items`, and every item is emitted [`PricedRef::Unbound`].
    pub fn enrich(&self, base_items: &[BaseItem], inputs: &[CostInput]) -> Vec<PricedItem> {
        let by_item: HashMap<&str, &CostInput> = inputs
            .iter()
            .map(|input| (input.base_item_id.as_str(), input))
            .collect();

        base_items
            .iter()
            .map(|item| {
                let breakdown = by_item
                    .get(item.id.as_str())
                    .map(|input| CostBreakdown::from(*input))
                    .unwrap_or_default();
                price_item(item, breakdown)
            })
            .collect()
    }

    pub fn aggregate_totals(&self, items: &[PricedItem]) -> Totals {
        aggregate_totals(items, self.config.vat_rate)
    }

    pub fn completion(&self, items: &[PricedItem]) -> Completion {
        completion(items)
    }
}

fn price_item(item: &BaseItem, breakdown: CostBreakdown) -> PricedItem {
    let subtotal = finite_or_zero(breakdown.subtotal_cost());
    let unit_price = if item.quantity > 0.0 {
        finite_or_zero(subtotal / item.quantity)
    } else {
        0.0
    };

    PricedItem {
        priced_id: PricedRef::Unbound,
        base_item_id: item.id.clone(),
        line_no: item.line_no,
        quantity: item.quantity,
        breakdown,
        unit_price,
        total_price: subtotal,
        is_priced: subtotal > 0.0,
    }
}

/// Reduce priced items into totals; `vat_rate` is a fraction.
pub fn aggregate_totals(items: &[PricedItem], vat_rate: f64) -> Totals {
    let mut total_value = 0.0;
    let mut profit_total = 0.0;
    let mut admin_total = 0.0;
    let mut operational_total = 0.0;

    for item in items {
        total_value += item.total_price;
        profit_total += item.breakdown.profit;
        admin_total += item.breakdown.admin;
        operational_total += item.breakdown.operational;
    }

    let vat_amount = finite_or_zero(total_value * vat_rate);

    Totals {
        total_value,
        vat_rate,
        vat_amount,
        total_with_vat: total_value + vat_amount,
        profit_total,
        admin_total,
        operational_total,
        profit_pct: percentage_of(profit_total, total_value),
        admin_operational_pct: percentage_of(admin_total + operational_total, total_value),
    }
}

pub fn completion(items: &[PricedItem]) -> Completion {
    let priced = items.iter().filter(|item| item.is_priced).count();
    let total = items.len();
    Completion {
        priced,
        total,
        percentage: percentage_of(priced as f64, total as f64),
    }
}

fn percentage_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    finite_or_zero(part / whole * 100.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

// ── Tests ──────────────────────────────────────────────────────
