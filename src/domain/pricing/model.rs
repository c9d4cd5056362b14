//! Pricing domain entities
//!
//! Cost breakdowns, priced items, priced versions and their totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a priced version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricedStatus {
    Draft,
    Partial,
    Completed,
    Approved,
}

impl Default for PricedStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl PricedStatus {
    /// Status implied by how many items carry a price.
    pub fn from_completion(completion: &Completion) -> Self {
        if completion.priced == 0 {
            Self::Draft
        } else if completion.priced < completion.total {
            Self::Partial
        } else {
            Self::Completed
        }
    }
}

impl std::fmt::Display for PricedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Partial => write!(f, "partial"),
            Self::Completed => write!(f, "completed"),
            Self::Approved => write!(f, "approved"),
        }
    }
}

/// Seven cost components of a priced item.
///
/// The subtotal is never stored independently: it is recomputed from the
/// components on every read, so `subtotal_cost == sum(components)` holds for
/// the whole lifetime of the value, including after deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "CostBreakdownRecord", from = "CostBreakdownRecord")]
pub struct CostBreakdown {
    pub materials: f64,
    pub labor: f64,
    pub equipment: f64,
    pub subcontract: f64,
    pub admin: f64,
    pub operational: f64,
    pub profit: f64,
}

impl CostBreakdown {
    pub fn subtotal_cost(&self) -> f64 {
        self.materials
            + self.labor
            + self.equipment
            + self.subcontract
            + self.admin
            + self.operational
            + self.profit
    }

    /// Materials + labor + equipment + subcontract
    pub fn direct_cost(&self) -> f64 {
        self.materials + self.labor + self.equipment + self.subcontract
    }
}

impl From<&CostInput> for CostBreakdown {
    fn from(input: &CostInput) -> Self {
        Self {
            materials: input.materials_cost,
            labor: input.labor_cost,
            equipment: input.equipment_cost,
            subcontract: input.subcontract_cost,
            admin: input.admin_cost,
            operational: input.operational_cost,
            profit: input.profit_cost,
        }
    }
}

/// Wire form of [`CostBreakdown`]; `subtotalCost` is emitted for readers and
/// ignored on the way back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CostBreakdownRecord {
    #[serde(default)]
    materials: f64,
    #[serde(default)]
    labor: f64,
    #[serde(default)]
    equipment: f64,
    #[serde(default)]
    subcontract: f64,
    #[serde(default)]
    admin: f64,
    #[serde(default)]
    operational: f64,
    #[serde(default)]
    profit: f64,
    #[serde(default)]
    subtotal_cost: f64,
}

impl From<CostBreakdown> for CostBreakdownRecord {
    fn from(b: CostBreakdown) -> Self {
        Self {
            materials: b.materials,
            labor: b.labor,
            equipment: b.equipment,
            subcontract: b.subcontract,
            admin: b.admin,
            operational: b.operational,
            profit: b.profit,
            subtotal_cost: b.subtotal_cost(),
        }
    }
}

impl From<CostBreakdownRecord> for CostBreakdown {
    fn from(r: CostBreakdownRecord) -> Self {
        Self {
            materials: r.materials,
            labor: r.labor,
            equipment: r.equipment,
            subcontract: r.subcontract,
            admin: r.admin,
            operational: r.operational,
            profit: r.profit,
        }
    }
}

/// Per-item cost input. Missing fields default to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostInput {
    pub base_item_id: String,
    #[serde(default)]
    pub materials_cost: f64,
    #[serde(default)]
    pub labor_cost: f64,
    #[serde(default)]
    pub equipment_cost: f64,
    #[serde(default)]
    pub subcontract_cost: f64,
    #[serde(default)]
    pub admin_cost: f64,
    #[serde(default)]
    pub operational_cost: f64,
    #[serde(default)]
    pub profit_cost: f64,
}

impl CostInput {
    pub fn new(base_item_id: impl Into<String>) -> Self {
        Self {
            base_item_id: base_item_id.into(),
            ..Self::default()
        }
    }

    /// Derive a cost input from resource rows.
    ///
    /// Administrative, operational and profit amounts are percentages of the
    /// direct subtotal; item-level overrides win over the tender defaults.
    pub fn from_resources(
        base_item_id: impl Into<String>,
        resources: &ItemResources,
        defaults: &DefaultPercentages,
    ) -> Self {
        let materials = sum_rows(&resources.materials);
        let labor = sum_rows(&resources.labor);
        let equipment = sum_rows(&resources.equipment);
        let subcontract = sum_rows(&resources.subcontractors);
        let direct = materials + labor + equipment + subcontract;

        let pct = resources.effective_percentages(defaults);

        Self {
            base_item_id: base_item_id.into(),
            materials_cost: materials,
            labor_cost: labor,
            equipment_cost: equipment,
            subcontract_cost: subcontract,
            admin_cost: direct * pct.administrative / 100.0,
            operational_cost: direct * pct.operational / 100.0,
            profit_cost: direct * pct.profit / 100.0,
        }
    }
}

fn sum_rows(rows: &[ResourceRow]) -> f64 {
    rows.iter().map(ResourceRow::line_total).sum()
}

/// Administrative / operational / profit percentages (0–100 scale)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPercentages {
    pub administrative: f64,
    pub operational: f64,
    pub profit: f64,
}

impl Default for DefaultPercentages {
    fn default() -> Self {
        Self {
            administrative: 5.0,
            operational: 5.0,
            profit: 15.0,
        }
    }
}

/// Item-level overrides of the tender default percentages
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrative: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
}

/// One resource line (a material, a crew, a machine, a subcontract package)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl ResourceRow {
    pub fn priced(name: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self {
            name: Some(name.into()),
            quantity: Some(quantity),
            price: Some(price),
            total: None,
        }
    }

    /// Explicit total when present and finite, else `quantity × price`, else 0
    pub fn line_total(&self) -> f64 {
        match self.total {
            Some(total) if total.is_finite() => total,
            _ => match (self.quantity, self.price) {
                (Some(q), Some(p)) if q.is_finite() && p.is_finite() => q * p,
                _ => 0.0,
            },
        }
    }
}

/// Resource-level pricing of a single BOQ item as entered by an estimator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResources {
    #[serde(default)]
    pub materials: Vec<ResourceRow>,
    #[serde(default)]
    pub labor: Vec<ResourceRow>,
    #[serde(default)]
    pub equipment: Vec<ResourceRow>,
    #[serde(default)]
    pub subcontractors: Vec<ResourceRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_percentages: Option<PercentageOverrides>,
}

impl ItemResources {
    pub fn effective_percentages(&self, defaults: &DefaultPercentages) -> DefaultPercentages {
        let overrides = self.additional_percentages.unwrap_or_default();
        DefaultPercentages {
            administrative: overrides.administrative.unwrap_or(defaults.administrative),
            operational: overrides.operational.unwrap_or(defaults.operational),
            profit: overrides.profit.unwrap_or(defaults.profit),
        }
    }
}

/// Reference from a priced item to its owning priced version.
///
/// The engine produces `Unbound` items; the repository binds them to the
/// version id when they are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum PricedRef {
    #[default]
    Unbound,
    Bound(String),
}

impl PricedRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Unbound => None,
            Self::Bound(id) => Some(id),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }
}

impl From<Option<String>> for PricedRef {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Unbound, Self::Bound)
    }
}

impl From<PricedRef> for Option<String> {
    fn from(value: PricedRef) -> Self {
        match value {
            PricedRef::Unbound => None,
            PricedRef::Bound(id) => Some(id),
        }
    }
}

/// A cost breakdown bound to a base item within one priced version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedItem {
    pub priced_id: PricedRef,
    /// Stable identity across priced versions
    pub base_item_id: String,
    pub line_no: u32,
    pub quantity: f64,
    pub breakdown: CostBreakdown,
    pub unit_price: f64,
    pub total_price: f64,
    pub is_priced: bool,
}

impl PricedItem {
    /// Version-scoped identity; `None` while unbound.
    pub fn id(&self) -> Option<String> {
        self.priced_id
            .id()
            .map(|priced_id| format!("{}:{}", priced_id, self.base_item_id))
    }

    pub fn bind(mut self, priced_id: &str) -> Self {
        self.priced_id = PricedRef::Bound(priced_id.to_string());
        self
    }
}

/// Aggregate figures of one priced version
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_value: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub total_with_vat: f64,
    pub profit_total: f64,
    pub admin_total: f64,
    pub operational_total: f64,
    /// Percentage of `total_value`; 0 when the total is 0
    pub profit_pct: f64,
    /// Percentage of `total_value`; 0 when the total is 0
    pub admin_operational_pct: f64,
}

/// How many items of a version carry a price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub priced: usize,
    pub total: usize,
    pub percentage: f64,
}

/// A pricing version of a base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Priced {
    pub id: String,
    pub base_id: String,
    /// Strictly increasing per base, never reused
    pub version: u32,
    pub status: PricedStatus,
    pub totals: Totals,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Priced {
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}

/// Input for creating a priced version; id and version are assigned by the
/// repository.
#[derive(Debug, Clone)]
pub struct NewPriced {
    pub base_id: String,
    pub status: PricedStatus,
    pub totals: Totals,
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_breakdown() -> CostBreakdown {
        CostBreakdown {
            materials: 100.0,
            labor: 50.0,
            equipment: 25.0,
            subcontract: 10.0,
            admin: 5.0,
            operational: 4.0,
            profit: 6.0,
        }
    }

    #[test]
    fn subtotal_is_sum_of_components() {
        let b = sample_breakdown();
        assert_eq!(b.subtotal_cost(), 200.0);
        assert_eq!(b.direct_cost(), 185.0);
    }

    #[test]
    fn subtotal_is_recomputed_on_deserialize() {
        let json = serde_json::json!({
            "materials": 10.0,
            "labor": 5.0,
            "subtotalCost": 999.0
        });
        let b: CostBreakdown = serde_json::from_value(json).unwrap();
        assert_eq!(b.subtotal_cost(), 15.0);

        let back = serde_json::to_value(b).unwrap();
        assert_eq!(back["subtotalCost"], 15.0);
    }

    #[test]
    fn cost_input_missing_fields_default_to_zero() {
        let input: CostInput =
            serde_json::from_str(r#"{"baseItemId":"i1","materialsCost":100}"#).unwrap();
        assert_eq!(input.materials_cost, 100.0);
        assert_eq!(input.labor_cost, 0.0);
        assert_eq!(CostBreakdown::from(&input).subtotal_cost(), 100.0);
    }

    #[test]
    fn resource_row_prefers_explicit_total() {
        let row = ResourceRow {
            total: Some(40.0),
            ..ResourceRow::priced("cement", 2.0, 10.0)
        };
        assert_eq!(row.line_total(), 40.0);
        assert_eq!(ResourceRow::priced("sand", 3.0, 7.0).line_total(), 21.0);
        assert_eq!(ResourceRow::default().line_total(), 0.0);
    }

    #[test]
    fn cost_input_from_resources_applies_percentages() {
        let resources = ItemResources {
            materials: vec![ResourceRow::priced("steel", 10.0, 50.0)],
            labor: vec![ResourceRow::priced("crew", 5.0, 100.0)],
            ..ItemResources::default()
        };
        let input = CostInput::from_resources("i1", &resources, &DefaultPercentages::default());

        assert_eq!(input.materials_cost, 500.0);
        assert_eq!(input.labor_cost, 500.0);
        assert_eq!(input.admin_cost, 50.0);
        assert_eq!(input.operational_cost, 50.0);
        assert_eq!(input.profit_cost, 150.0);
    }

    #[test]
    fn item_overrides_win_over_defaults() {
        let resources = ItemResources {
            subcontractors: vec![ResourceRow {
                total: Some(1000.0),
                ..ResourceRow::default()
            }],
            additional_percentages: Some(PercentageOverrides {
                profit: Some(10.0),
                ..PercentageOverrides::default()
            }),
            ..ItemResources::default()
        };
        let input = CostInput::from_resources("i1", &resources, &DefaultPercentages::default());

        assert_eq!(input.subcontract_cost, 1000.0);
        assert_eq!(input.admin_cost, 50.0);
        assert_eq!(input.profit_cost, 100.0);
    }

    #[test]
    fn priced_ref_serializes_as_optional_id() {
        assert_eq!(serde_json::to_value(PricedRef::Unbound).unwrap(), serde_json::Value::Null);
        let bound: PricedRef = serde_json::from_str(r#""p1""#).unwrap();
        assert_eq!(bound, PricedRef::Bound("p1".into()));
        assert_eq!(bound.id(), Some("p1"));
    }

    #[test]
    fn priced_item_id_only_when_bound() {
        let item = PricedItem {
            priced_id: PricedRef::Unbound,
            base_item_id: "i1".into(),
            line_no: 1,
            quantity: 1.0,
            breakdown: CostBreakdown::default(),
            unit_price: 0.0,
            total_price: 0.0,
            is_priced: false,
        };
        assert_eq!(item.id(), None);
        assert_eq!(item.bind("p9").id().as_deref(), Some("p9:i1"));
    }

    #[test]
    fn status_from_completion() {
        let c = |priced, total| Completion {
            priced,
            total,
            percentage: 0.0,
        };
        assert_eq!(PricedStatus::from_completion(&c(0, 3)), PricedStatus::Draft);
        assert_eq!(PricedStatus::from_completion(&c(1, 3)), PricedStatus::Partial);
        assert_eq!(PricedStatus::from_completion(&c(3, 3)), PricedStatus::Completed);
        assert_eq!(PricedStatus::from_completion(&c(0, 0)), PricedStatus::Draft);
    }

    #[test]
    fn status_display() {
        assert_eq!(PricedStatus::Approved.to_string(), "approved");
        assert_eq!(
            serde_json::to_value(PricedStatus::Partial).unwrap(),
            serde_json::json!("partial")
        );
    }
}
