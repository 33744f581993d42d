// ABOUTME: Durable record types: deployment records, stages, snapshots, rollback info.
// ABOUTME: Status transitions are enforced through the allowed-graph check here.

use crate::provider::ErrorClass;
use crate::types::{DeploymentId, Environment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of one deployment attempt.
///
/// Allowed transitions: pending -> in_progress -> completed | failed,
/// and failed -> rolled_back. Everything else is rejected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

impl DeploymentStatus {
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (InProgress, Completed) | (InProgress, Failed) | (Failed, RolledBack)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed | DeploymentStatus::Failed | DeploymentStatus::RolledBack
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One entry in the append-only stage log of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// The classified error that failed a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedError {
    pub class: ErrorClass,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Pre-flight risk assessment persisted with the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub score: f64,
    pub factors: Vec<String>,
    pub recommendation: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Outcome of restoring a single resource during rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub success: bool,
    pub details: Option<String>,
    pub error: Option<String>,
}

impl ResourceOutcome {
    pub fn ok(details: impl Into<String>) -> Self {
        Self {
            success: true,
            details: Some(details.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            details: None,
            error: Some(error.into()),
        }
    }
}

/// One post-rollback verification probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub name: String,
    pub success: bool,
    pub details: String,
}

/// Written onto a record only after a rollback has been executed against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub target: DeploymentId,
    pub reason: String,
    pub duration_ms: u64,
    pub results: BTreeMap<String, ResourceOutcome>,
    pub checks: Vec<VerificationCheck>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub stages_completed: u32,
    pub stages_failed: u32,
}

impl Metrics {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start_time: start,
            end_time: None,
            duration_ms: None,
            stages_completed: 0,
            stages_failed: 0,
        }
    }
}

/// Who and where a deployment was started from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub user: String,
    pub hostname: String,
    pub branch: Option<String>,
    pub commit: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            branch: None,
            commit: None,
        }
    }
}

/// The durable description of one deployment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub environment: Environment,
    pub created_at: DateTime<Utc>,
    pub status: DeploymentStatus,
    /// Sanitized (secrets redacted) snapshot of the resolved configuration.
    pub config: serde_json::Value,
    pub config_fingerprint: String,
    pub stages: Vec<StageRecord>,
    /// Opaque per-resource descriptors needed to reproduce or roll back.
    /// Populated incrementally as stages produce them.
    pub artifacts: BTreeMap<String, serde_json::Value>,
    pub risk_analysis: Option<RiskAnalysis>,
    pub error: Option<RecordedError>,
    pub rollback_info: Option<RollbackInfo>,
    pub metrics: Metrics,
    pub metadata: Metadata,
}

/// Summary row in the bounded history index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: DeploymentId,
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,
    pub status: DeploymentStatus,
    pub duration_ms: Option<u64>,
    pub user: String,
    pub branch: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub config_fingerprint: String,
    pub rolled_back: bool,
}

impl From<&DeploymentRecord> for HistoryEntry {
    fn from(record: &DeploymentRecord) -> Self {
        Self {
            id: record.id.clone(),
            environment: record.environment,
            timestamp: record.created_at,
            status: record.status,
            duration_ms: record.metrics.duration_ms,
            user: record.metadata.user.clone(),
            branch: record.metadata.branch.clone(),
            error_class: record.error.as_ref().map(|e| e.class),
            config_fingerprint: record.config_fingerprint.clone(),
            rolled_back: record.rollback_info.is_some(),
        }
    }
}

/// Partial update applied through `StateStore::update`.
#[derive(Debug, Clone, Default)]
pub struct UpdateFields {
    pub status: Option<DeploymentStatus>,
    pub risk_analysis: Option<RiskAnalysis>,
    pub error: Option<RecordedError>,
    /// Merged into the record's artifact map per key.
    pub artifacts: BTreeMap<String, serde_json::Value>,
    pub rollback_info: Option<RollbackInfo>,
}

impl UpdateFields {
    pub fn status(status: DeploymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: RecordedError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_risk_analysis(mut self, risk: RiskAnalysis) -> Self {
        self.risk_analysis = Some(risk);
        self
    }
}

/// Resolved target for a rollback: the last successful record of the
/// same environment, with the artifacts needed to restore it.
#[derive(Debug, Clone)]
pub struct RollbackTarget {
    pub current: DeploymentId,
    pub target: DeploymentId,
    pub environment: Environment,
    pub artifacts: BTreeMap<String, serde_json::Value>,
    pub config: serde_json::Value,
}

/// Immutable pre-deployment capture of remote resource state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub deployment: DeploymentId,
    pub environment: Environment,
    pub captured_at: DateTime<Utc>,
    /// Resource kind -> opaque state descriptor. Partial captures are valid.
    pub resources: BTreeMap<String, serde_json::Value>,
    pub config: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_graph_allows_only_known_edges() {
        use DeploymentStatus::*;
        let all = [Pending, InProgress, Completed, Failed, RolledBack];
        let allowed = [
            (Pending, InProgress),
            (InProgress, Completed),
            (InProgress, Failed),
            (Failed, RolledBack),
        ];

        for from in all {
            for to in all {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn completed_and_rolled_back_are_terminal() {
        assert!(DeploymentStatus::Completed.is_terminal());
        assert!(DeploymentStatus::RolledBack.is_terminal());
        assert!(!DeploymentStatus::InProgress.is_terminal());
    }

    #[test]
    fn history_entry_carries_error_class() {
        let mut record = DeploymentRecord {
            id: DeploymentId::new("deploy-1"),
            environment: Environment::Staging,
            created_at: Utc::now(),
            status: DeploymentStatus::Failed,
            config: serde_json::json!({}),
            config_fingerprint: "abcd1234".to_string(),
            stages: Vec::new(),
            artifacts: BTreeMap::new(),
            risk_analysis: None,
            error: None,
            rollback_info: None,
            metrics: Metrics::starting_at(Utc::now()),
            metadata: Metadata::default(),
        };
        record.error = Some(RecordedError {
            class: ErrorClass::Timeout,
            message: "stage timed out".to_string(),
            occurred_at: Utc::now(),
        });

        let entry = HistoryEntry::from(&record);
        assert_eq!(entry.error_class, Some(ErrorClass::Timeout));
        assert!(!entry.rolled_back);
    }
}
