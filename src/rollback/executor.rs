// ABOUTME: Snapshot capture and rollback execution against the cloud provider.
// ABOUTME: Restores run concurrently per resource; success is gated on verification.

use super::error::RollbackError;
use crate::config::ResolvedConfig;
use crate::provider::{CloudProvider, ResourceKind};
use crate::store::{
    DeploymentStatus, ResourceOutcome, RollbackInfo, Snapshot, StateStore, StoreError,
    VerificationCheck,
};
use crate::types::{DeploymentId, Environment, SnapshotId};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

/// What a completed rollback did: which resources were restored and which
/// verification probes passed.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub target: DeploymentId,
    pub duration_ms: u64,
    pub results: BTreeMap<String, ResourceOutcome>,
    pub checks: Vec<VerificationCheck>,
}

/// A completed deployment offered as a manual rollback destination.
#[derive(Debug, Clone)]
pub struct RollbackCandidate {
    pub id: DeploymentId,
    pub timestamp: chrono::DateTime<Utc>,
    pub user: String,
    pub branch: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Executes snapshot capture and rollback through a [`CloudProvider`].
///
/// Every provider call is bounded by a timeout; a rollback is only reported
/// as successful after all verification checks pass.
pub struct RollbackExecutor<C: CloudProvider> {
    provider: Arc<C>,
    store: Arc<StateStore>,
    op_timeout: Duration,
    health_timeout: Duration,
}

impl<C: CloudProvider> RollbackExecutor<C> {
    pub fn new(provider: Arc<C>, store: Arc<StateStore>) -> Self {
        Self {
            provider,
            store,
            op_timeout: DEFAULT_OP_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, op_timeout: Duration, health_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self.health_timeout = health_timeout;
        self
    }

    /// Capture the current remote state of every resource the config names.
    ///
    /// Best effort: a capture failure or timeout degrades to a partial
    /// snapshot rather than failing the deployment.
    pub async fn capture_snapshot(
        &self,
        id: &DeploymentId,
        config: &ResolvedConfig,
    ) -> Result<SnapshotId, StoreError> {
        let mut resources = BTreeMap::new();

        for (kind, resource_id) in named_resources(config) {
            let capture = tokio::time::timeout(
                self.op_timeout,
                self.provider.capture_state(kind, &resource_id),
            )
            .await;

            match capture {
                Ok(Ok(state)) => {
                    resources.insert(kind.as_str().to_string(), state);
                }
                Ok(Err(err)) => {
                    tracing::warn!(%kind, resource = %resource_id, error = %err, "snapshot capture failed, continuing without it");
                }
                Err(_) => {
                    tracing::warn!(%kind, resource = %resource_id, "snapshot capture timed out, continuing without it");
                }
            }
        }

        let snapshot = Snapshot {
            deployment: id.clone(),
            environment: config.environment,
            captured_at: Utc::now(),
            resources,
            config: config.sanitized(),
        };
        self.store.create_snapshot(&snapshot)
    }

    /// Roll a failed deployment back to the last successful one.
    ///
    /// Per-resource restorations run concurrently and are recorded
    /// independently; a single resource failure does not stop the others.
    /// The record only transitions to `rolled_back` if every verification
    /// check passes afterwards.
    pub async fn rollback(
        &self,
        id: &DeploymentId,
        config: &ResolvedConfig,
        reason: &str,
    ) -> Result<RollbackReport, RollbackError> {
        let started = Instant::now();
        let target = self.store.rollback_info(id)?;
        tracing::debug!(from = %id, to = %target.target, reason, "starting rollback");

        let snapshot = self.store.load_snapshot(id)?;
        let restores = named_resources(config).into_iter().map(|(kind, resource_id)| {
            let descriptor = target
                .artifacts
                .get(kind.as_str())
                .or_else(|| snapshot.as_ref().and_then(|s| s.resources.get(kind.as_str())))
                .cloned();
            self.restore_one(kind, resource_id, descriptor)
        });
        let results: BTreeMap<String, ResourceOutcome> =
            futures::future::join_all(restores).await.into_iter().collect();

        let checks = self.verify(config).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if checks.iter().any(|c| !c.success) {
            for check in checks.iter().filter(|c| !c.success) {
                tracing::warn!(check = %check.name, details = %check.details, "rollback verification check failed");
            }
            return Err(RollbackError::VerificationFailed { checks });
        }

        let info = RollbackInfo {
            target: target.target.clone(),
            reason: reason.to_string(),
            duration_ms,
            results: results.clone(),
            checks: checks.clone(),
            executed_at: Utc::now(),
        };
        self.store.mark_rolled_back(id, info)?;

        Ok(RollbackReport {
            target: target.target,
            duration_ms,
            results,
            checks,
        })
    }

    /// Completed deployments usable as manual rollback destinations,
    /// newest first.
    pub fn list_targets(
        &self,
        environment: Environment,
        limit: usize,
    ) -> Result<Vec<RollbackCandidate>, StoreError> {
        let entries = self.store.history(Some(environment), usize::MAX)?;
        Ok(entries
            .into_iter()
            .filter(|e| e.status == DeploymentStatus::Completed)
            .take(limit)
            .map(|e| RollbackCandidate {
                id: e.id,
                timestamp: e.timestamp,
                user: e.user,
                branch: e.branch,
                duration_ms: e.duration_ms,
            })
            .collect())
    }

    async fn restore_one(
        &self,
        kind: ResourceKind,
        resource_id: String,
        descriptor: Option<serde_json::Value>,
    ) -> (String, ResourceOutcome) {
        let key = kind.as_str().to_string();

        // CDN distributions are not restored, only invalidated so the
        // restored bucket content becomes visible.
        let operation = async {
            match kind {
                ResourceKind::Cdn => self.provider.invalidate(kind, &resource_id).await,
                _ => match &descriptor {
                    Some(descriptor) => self.provider.restore(kind, &resource_id, descriptor).await,
                    None => {
                        return Err(crate::provider::ProviderError::Other(format!(
                            "no rollback descriptor for {kind} {resource_id}"
                        )));
                    }
                },
            }
        };

        let outcome = match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(Ok(summary)) => ResourceOutcome::ok(summary),
            Ok(Err(err)) => {
                tracing::warn!(%kind, resource = %resource_id, error = %err, "resource restore failed");
                ResourceOutcome::failed(err.to_string())
            }
            Err(_) => {
                tracing::warn!(%kind, resource = %resource_id, "resource restore timed out");
                ResourceOutcome::failed("restore timed out")
            }
        };
        (key, outcome)
    }

    async fn verify(&self, config: &ResolvedConfig) -> Vec<VerificationCheck> {
        let mut checks = Vec::new();

        if let Some(url) = &config.frontend.base_url {
            let status = self.provider.check_health(url, self.health_timeout).await;
            checks.push(VerificationCheck {
                name: "frontend".to_string(),
                success: status.success,
                details: status.details,
            });
        }
        if let Some(url) = &config.backend.gateway_url {
            let health_url = format!("{}/health", url.trim_end_matches('/'));
            let status = self
                .provider
                .check_health(&health_url, self.health_timeout)
                .await;
            checks.push(VerificationCheck {
                name: "api".to_string(),
                success: status.success,
                details: status.details,
            });
        }

        checks
    }
}

/// The (kind, id) pairs a config actually names. Order matches the
/// deployment stages: storage first, compute, routing, then cache.
pub fn named_resources(config: &ResolvedConfig) -> Vec<(ResourceKind, String)> {
    let mut resources = vec![
        (ResourceKind::Bucket, config.frontend.bucket.clone()),
        (ResourceKind::Function, config.backend.function_name.clone()),
    ];
    if let Some(gateway_id) = &config.backend.gateway_id {
        resources.push((ResourceKind::Gateway, gateway_id.clone()));
    }
    if let Some(cdn_id) = &config.frontend.cdn_distribution_id {
        resources.push((ResourceKind::Cdn, cdn_id.clone()));
    }
    resources
}
