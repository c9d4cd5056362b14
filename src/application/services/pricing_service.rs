//! Pricing orchestration
//!
//! Ties the engine, repositories, integrity and diff services together:
//! price a base into a new version, approve (seal) a version, verify a sealed
//! version, compare versions, and prune old drafts.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::diff::{DiffService, PricingDiff};
use super::integrity::IntegrityService;
use super::pricing_engine::{EngineConfig, PricingEngine};
use crate::domain::{
    Completion, CostInput, DomainError, DomainResult, NewPriced, Priced, PricedItem, PricedStatus,
    RepositoryProvider, Snapshot, SnapshotMeta,
};
use crate::shared::{retry_with_backoff, RetryConfig};

/// How many priced versions of a base to keep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    /// `None` keeps everything. Finalized versions and the latest version
    /// are never pruned, so more than `keep_last` may survive.
    pub keep_last: Option<usize>,
}

impl RetentionPolicy {
    pub fn keep_last(count: usize) -> Self {
        Self {
            keep_last: Some(count),
        }
    }

    /// Ids to prune from `versions` (ascending by version)
    pub fn select_prunable(&self, versions: &[Priced]) -> Vec<String> {
        let Some(keep) = self.keep_last else {
            return Vec::new();
        };
        let latest = versions.iter().map(|p| p.version).max();
        let mut excess = versions.len().saturating_sub(keep.max(1));

        let mut prunable = Vec::new();
        for priced in versions {
            if excess == 0 {
                break;
            }
            if priced.is_finalized() || Some(priced.version) == latest {
                continue;
            }
            prunable.push(priced.id.clone());
            excess -= 1;
        }
        prunable
    }
}

/// A freshly priced version with its persisted items
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedVersion {
    pub priced: Priced,
    pub items: Vec<PricedItem>,
    pub completion: Completion,
}

pub struct PricingService {
    repos: Arc<dyn RepositoryProvider>,
    engine: PricingEngine,
    integrity: IntegrityService,
    diff: DiffService,
    retention: RetentionPolicy,
    retry: RetryConfig,
    approval_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PricingService {
    pub fn new(repos: Arc<dyn RepositoryProvider>, config: EngineConfig) -> Self {
        Self {
            repos,
            engine: PricingEngine::new(config),
            integrity: IntegrityService::new().with_engine_config(config),
            diff: DiffService::new(),
            retention: RetentionPolicy::default(),
            retry: RetryConfig::default(),
            approval_locks: DashMap::new(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn engine(&self) -> &PricingEngine {
        &self.engine
    }

    /// Price every item of a base and store the result as a new version.
    pub async fn price_base(&self, base_id: &str, inputs: &[CostInput]) -> DomainResult<PricedVersion> {
        if self.repos.bases().get_by_id(base_id).await?.is_none() {
            return Err(DomainError::not_found("Base", "id", base_id));
        }
        let base_items = self.repos.bases().list_items(base_id).await?;

        let priced_items = self.engine.enrich(&base_items, inputs);
        let totals = self.engine.aggregate_totals(&priced_items);
        let completion = self.engine.completion(&priced_items);

        // Not retried: a timed-out create may still have landed.
        let priced = self
            .repos
            .priced()
            .create(NewPriced {
                base_id: base_id.to_string(),
                status: PricedStatus::from_completion(&completion),
                totals,
            })
            .await?;

        let items = retry_with_backoff(&self.retry, "replace_priced_items", DomainError::is_transient, || {
            self.repos.priced_items().replace_all(&priced.id, priced_items.clone())
        })
        .await?;

        info!(
            base_id,
            priced_id = %priced.id,
            version = priced.version,
            total_value = totals.total_value,
            priced_items = completion.priced,
            items = completion.total,
            "Base priced"
        );

        if let Err(e) = self.apply_retention(base_id).await {
            warn!(base_id, error = %e, "Retention pass failed");
        }

        Ok(PricedVersion {
            priced,
            items,
            completion,
        })
    }

    /// Seal a priced version: mark it finalized, then record its snapshot.
    ///
    /// The version is frozen before it is hashed, so its items cannot change
    /// under the snapshot. A version left finalized without a snapshot by an
    /// interrupted approval is sealed on the next call.
    pub async fn approve(&self, priced_id: &str, meta: SnapshotMeta) -> DomainResult<Snapshot> {
        let lock = self
            .approval_locks
            .entry(priced_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let priced = self.load_priced(priced_id).await?;
        if self.repos.snapshots().get_by_priced(priced_id).await?.is_some() {
            return Err(DomainError::AlreadyFinalized {
                priced_id: priced_id.to_string(),
            });
        }

        let finalized = if priced.is_finalized() {
            warn!(priced_id, "Version finalized without a snapshot; completing approval");
            priced
        } else {
            self.finalize(priced).await?
        };

        let items = self.repos.priced_items().list(priced_id).await?;
        let snapshot = self
            .integrity
            .create_snapshot(priced_id, &items, &finalized.totals, meta)?;
        // Not retried: a timed-out create may still have landed.
        let snapshot = self.repos.snapshots().create(snapshot).await?;

        info!(
            priced_id,
            version = finalized.version,
            integrity_hash = %snapshot.integrity_hash,
            approved_by = ?snapshot.meta.approved_by,
            "Priced version approved"
        );
        Ok(snapshot)
    }

    async fn finalize(&self, priced: Priced) -> DomainResult<Priced> {
        let mut finalized = priced;
        finalized.status = PricedStatus::Approved;
        finalized.finalized_at = Some(Utc::now());

        let result = retry_with_backoff(&self.retry, "finalize_priced", DomainError::is_transient, || {
            self.repos.priced().update(finalized.clone())
        })
        .await;
        match result {
            // An attempt that timed out had landed after all
            Err(DomainError::VersionFinalized { priced_id }) => self.load_priced(&priced_id).await,
            other => other,
        }
    }

    /// Recompute the hashes of a sealed version against its snapshot
    pub async fn verify(&self, priced_id: &str) -> DomainResult<()> {
        let snapshot = self
            .repos
            .snapshots()
            .get_by_priced(priced_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Snapshot", "priced_id", priced_id))?;
        let priced = self.load_priced(priced_id).await?;
        let items = self.repos.priced_items().list(priced_id).await?;

        self.integrity.verify(&snapshot, &items, &priced.totals)?;
        info!(priced_id, "Integrity verified");
        Ok(())
    }

    pub async fn diff_versions(&self, base_id: &str, from: u32, to: u32) -> DomainResult<PricingDiff> {
        let old = self.load_version(base_id, from).await?;
        let new = self.load_version(base_id, to).await?;

        let old_items = self.repos.priced_items().list(&old.id).await?;
        let new_items = self.repos.priced_items().list(&new.id).await?;
        Ok(self.diff.compute(&old_items, &new_items))
    }

    /// Diff a version against the most recent approved version of its base
    /// that precedes it. `None` when nothing has been approved yet.
    pub async fn diff_against_approved(&self, priced_id: &str) -> DomainResult<Option<PricingDiff>> {
        let priced = self.load_priced(priced_id).await?;
        let versions = self.repos.priced().list_versions(&priced.base_id).await?;

        let approved = versions
            .into_iter()
            .filter(|p| p.is_finalized() && p.version < priced.version)
            .max_by_key(|p| p.version);
        let Some(approved) = approved else {
            return Ok(None);
        };

        let old_items = self.repos.priced_items().list(&approved.id).await?;
        let new_items = self.repos.priced_items().list(&priced.id).await?;
        Ok(Some(self.diff.compute(&old_items, &new_items)))
    }

    /// Prune versions per the retention policy; returns the deleted ids
    pub async fn apply_retention(&self, base_id: &str) -> DomainResult<Vec<String>> {
        if self.retention.keep_last.is_none() {
            return Ok(Vec::new());
        }
        let versions = self.repos.priced().list_versions(base_id).await?;
        let prunable = self.retention.select_prunable(&versions);

        for id in &prunable {
            self.repos.priced().delete(id).await?;
        }
        if !prunable.is_empty() {
            info!(base_id, pruned = prunable.len(), "Old priced versions pruned");
        }
        Ok(prunable)
    }

    async fn load_priced(&self, priced_id: &str) -> DomainResult<Priced> {
        self.repos
            .priced()
            .get_by_id(priced_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Priced", "id", priced_id))
    }

    async fn load_version(&self, base_id: &str, version: u32) -> DomainResult<Priced> {
        self.repos
            .priced()
            .get_version(base_id, version)
            .await?
            .ok_or_else(|| DomainError::not_found("Priced", "version", version.to_string()))
    }
}
