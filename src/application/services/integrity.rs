//! Snapshot creation and integrity verification
//!
//! Priced items and totals are rendered into a canonical text form before
//! hashing: object keys sorted, every number printed with six fixed decimals
//! (`-0` folded into `0`), items ordered by line number then base item id.
//! The same stored data therefore hashes identically on any platform.

use std::fmt::Write as _;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info};

use super::pricing_engine::EngineConfig;
use crate::domain::{DomainError, DomainResult, PricedItem, Snapshot, SnapshotMeta, Totals};

const NUMBER_DECIMALS: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct IntegrityService {
    engine_config: Option<EngineConfig>,
}

impl IntegrityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hash of the engine configuration in every snapshot
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = Some(config);
        self
    }

    pub fn create_snapshot(
        &self,
        priced_id: &str,
        items: &[PricedItem],
        totals: &Totals,
        meta: SnapshotMeta,
    ) -> DomainResult<Snapshot> {
        let integrity_hash = integrity_hash(items, totals)?;
        let totals_hash = totals_hash(totals)?;
        let config_hash = self.engine_config.as_ref().map(hash_of).transpose()?;

        info!(priced_id, %integrity_hash, items = items.len(), "Snapshot created");

        Ok(Snapshot {
            priced_id: priced_id.to_string(),
            integrity_hash,
            totals_hash,
            config_hash,
            meta,
            created_at: Utc::now(),
        })
    }

    /// Recompute both hashes and compare with the snapshot.
    /// A mismatch is reported, never repaired.
    pub fn verify(&self, snapshot: &Snapshot, items: &[PricedItem], totals: &Totals) -> DomainResult<()> {
        let recomputed_totals = totals_hash(totals)?;
        let recomputed_integrity = integrity_hash(items, totals)?;

        let detail = if recomputed_totals != snapshot.totals_hash {
            Some(format!(
                "totals hash {} != stored {}",
                recomputed_totals, snapshot.totals_hash
            ))
        } else if recomputed_integrity != snapshot.integrity_hash {
            Some(format!(
                "integrity hash {} != stored {}",
                recomputed_integrity, snapshot.integrity_hash
            ))
        } else {
            None
        };

        match detail {
            None => Ok(()),
            Some(detail) => {
                error!(priced_id = %snapshot.priced_id, %detail, "Integrity mismatch");
                Err(DomainError::IntegrityMismatch {
                    priced_id: snapshot.priced_id.clone(),
                    detail,
                })
            }
        }
    }
}

#[derive(Serialize)]
struct IntegrityPayload<'a> {
    items: Vec<&'a PricedItem>,
    totals: &'a Totals,
}

pub fn integrity_hash(items: &[PricedItem], totals: &Totals) -> DomainResult<String> {
    let mut ordered: Vec<&PricedItem> = items.iter().collect();
    ordered.sort_by(|a, b| {
        a.line_no
            .cmp(&b.line_no)
            .then_with(|| a.base_item_id.cmp(&b.base_item_id))
    });
    hash_of(&IntegrityPayload {
        items: ordered,
        totals,
    })
}

pub fn totals_hash(totals: &Totals) -> DomainResult<String> {
    hash_of(totals)
}

fn hash_of<T: Serialize + ?Sized>(value: &T) -> DomainResult<String> {
    let value = serde_json::to_value(value).map_err(crate::shared::StorageError::from)?;
    Ok(sha256_hex(&canonical_json(&value)))
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical text form of a JSON value
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let f = n.as_f64().unwrap_or(0.0);
            let f = if f == 0.0 || !f.is_finite() { 0.0 } else { f };
            let _ = write!(out, "{:.*}", NUMBER_DECIMALS, f);
        }
        Value::String(s) => {
            out.push_str(&Value::String(s.clone()).to_string());
        }
        Value::Array(values) => {
            out.push('[');
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}
