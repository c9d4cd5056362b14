//! Storage key layout

pub fn base(id: &str) -> String {
    format!("boq:base:{id}")
}

/// Ids of every base of a tender
pub fn tender_bases(tender_id: &str) -> String {
    format!("boq:tender-index:{tender_id}")
}

pub fn base_items(base_id: &str) -> String {
    format!("boq:base-items:{base_id}")
}

pub fn priced(id: &str) -> String {
    format!("pricing:priced:{id}")
}

/// `(version, priced id)` pairs of a base
pub fn priced_versions(base_id: &str) -> String {
    format!("pricing:versions:{base_id}")
}

/// Whole item set of one priced version; a single key keeps swaps atomic
pub fn priced_items(priced_id: &str) -> String {
    format!("pricing:items:{priced_id}")
}

pub fn snapshot(priced_id: &str) -> String {
    format!("pricing:snapshot:{priced_id}")
}

pub const TENDER_PRICING_PREFIX: &str = "tender-pricing:";
pub const LEGACY_TENDER_PRICING_PREFIX: &str = "tender-pricing-";

pub fn tender_pricing(tender_id: &str) -> String {
    format!("{TENDER_PRICING_PREFIX}{tender_id}")
}

pub fn legacy_tender_pricing(tender_id: &str) -> String {
    format!("{LEGACY_TENDER_PRICING_PREFIX}{tender_id}")
}
