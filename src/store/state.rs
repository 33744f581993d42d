// ABOUTME: File-backed deployment state store with a bounded history index.
// ABOUTME: Atomic writes (temp file + rename) keep concurrent readers consistent.

use super::error::StoreError;
use super::record::{
    DeploymentRecord, DeploymentStatus, HistoryEntry, Metadata, Metrics, RollbackInfo,
    RollbackTarget, Snapshot, StageRecord, StageStatus, UpdateFields,
};
use super::stats::{self, DeploymentStatistics, PatternReport};
use crate::types::{DeploymentId, Environment, SnapshotId};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const HISTORY_FILENAME: &str = "history.json";
const SNAPSHOTS_DIR: &str = "snapshots";
const DEFAULT_MAX_HISTORY: usize = 100;
const DEFAULT_SNAPSHOT_RETENTION: usize = 5;

/// Persists deployment records, the history index, and snapshots under a
/// single root directory. One JSON file per record; `history.json` holds the
/// bounded newest-first index; `snapshots/` holds one file per deployment.
///
/// All mutations take the write lock and land via rename, so a concurrent
/// reader of the same record always sees a complete document.
pub struct StateStore {
    root: PathBuf,
    max_history: usize,
    snapshot_retention: usize,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("root", &self.root)
            .field("max_history", &self.max_history)
            .finish()
    }
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_limits(root, DEFAULT_MAX_HISTORY, DEFAULT_SNAPSHOT_RETENTION)
    }

    pub fn with_limits(
        root: impl Into<PathBuf>,
        max_history: usize,
        snapshot_retention: usize,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(root.join(SNAPSHOTS_DIR))?;
        Ok(Self {
            root,
            max_history,
            snapshot_retention,
            write_lock: Mutex::new(()),
        })
    }

    /// Create a new record with status `in_progress`.
    pub fn create(
        &self,
        environment: Environment,
        config: serde_json::Value,
        config_fingerprint: String,
        metadata: Metadata,
    ) -> Result<DeploymentRecord, StoreError> {
        let now = Utc::now();
        let record = DeploymentRecord {
            id: DeploymentId::generate(),
            environment,
            created_at: now,
            status: DeploymentStatus::InProgress,
            config,
            config_fingerprint,
            stages: Vec::new(),
            artifacts: BTreeMap::new(),
            risk_analysis: None,
            error: None,
            rollback_info: None,
            metrics: Metrics::starting_at(now),
            metadata,
        };

        self.save(&record)?;
        tracing::debug!(id = %record.id, environment = %environment, "created deployment record");
        Ok(record)
    }

    pub fn load(&self, id: &DeploymentId) -> Result<DeploymentRecord, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Merge partial fields into a record. Status changes are checked against
    /// the allowed transition graph; a transition into a terminal status
    /// stamps the end time and duration.
    pub fn update(
        &self,
        id: &DeploymentId,
        fields: UpdateFields,
    ) -> Result<DeploymentRecord, StoreError> {
        let mut record = self.load(id)?;

        if let Some(next) = fields.status
            && next != record.status
        {
            if !record.status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    from: record.status,
                    to: next,
                });
            }
            record.status = next;
            if next.is_terminal() && record.metrics.end_time.is_none() {
                let end = Utc::now();
                record.metrics.end_time = Some(end);
                record.metrics.duration_ms =
                    Some((end - record.metrics.start_time).num_milliseconds().max(0) as u64);
            }
        }

        if let Some(risk) = fields.risk_analysis {
            record.risk_analysis = Some(risk);
        }
        if let Some(error) = fields.error {
            record.error = Some(error);
        }
        if let Some(info) = fields.rollback_info {
            record.rollback_info = Some(info);
        }
        record.artifacts.extend(fields.artifacts);

        self.save(&record)?;
        Ok(record)
    }

    /// Append a stage entry. Stage history never shrinks or rewrites.
    pub fn add_stage(
        &self,
        id: &DeploymentId,
        name: &str,
        status: StageStatus,
        details: serde_json::Value,
    ) -> Result<StageRecord, StoreError> {
        let mut record = self.load(id)?;

        let duration_ms = details
            .get("duration_ms")
            .and_then(serde_json::Value::as_u64);
        let stage = StageRecord {
            name: name.to_string(),
            status,
            started_at: Utc::now(),
            duration_ms,
            details,
        };

        match status {
            StageStatus::Completed => record.metrics.stages_completed += 1,
            StageStatus::Failed => record.metrics.stages_failed += 1,
            _ => {}
        }

        record.stages.push(stage.clone());
        self.save(&record)?;
        Ok(stage)
    }

    /// Most recent history entries, newest first.
    pub fn history(
        &self,
        environment: Option<Environment>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let entries = self.load_history()?;
        Ok(entries
            .into_iter()
            .filter(|e| environment.is_none_or(|env| e.environment == env))
            .take(limit)
            .collect())
    }

    /// Most recent record that completed successfully.
    pub fn last_successful(
        &self,
        environment: Environment,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        let entries = self.history(Some(environment), self.max_history)?;
        for entry in entries {
            if entry.status == DeploymentStatus::Completed {
                return Ok(Some(self.load(&entry.id)?));
            }
        }
        Ok(None)
    }

    /// Resolve what a rollback of `id` should restore.
    ///
    /// # Errors
    ///
    /// `StoreError::NoRollbackTarget` when the environment has no completed
    /// deployment to fall back to.
    pub fn rollback_info(&self, id: &DeploymentId) -> Result<RollbackTarget, StoreError> {
        let record = self.load(id)?;
        let previous = self
            .last_successful(record.environment)?
            .ok_or(StoreError::NoRollbackTarget(record.environment))?;

        Ok(RollbackTarget {
            current: record.id,
            target: previous.id,
            environment: record.environment,
            artifacts: previous.artifacts,
            config: previous.config,
        })
    }

    /// Mark a failed record as rolled back. The transition check guarantees
    /// this is only reachable from `failed`.
    pub fn mark_rolled_back(
        &self,
        id: &DeploymentId,
        info: RollbackInfo,
    ) -> Result<DeploymentRecord, StoreError> {
        let mut fields = UpdateFields::status(DeploymentStatus::RolledBack);
        fields.rollback_info = Some(info);
        self.update(id, fields)
    }

    /// Persist a pre-deployment snapshot. Old snapshots beyond the retention
    /// count are pruned, oldest first.
    pub fn create_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotId, StoreError> {
        let snapshot_id = SnapshotId::for_deployment(&snapshot.deployment);
        let path = self.snapshot_path(&snapshot.deployment);

        let _guard = self.write_lock.lock();
        write_atomic(&path, &serde_json::to_vec_pretty(snapshot)?)?;
        self.prune_snapshots()?;
        Ok(snapshot_id)
    }

    pub fn load_snapshot(&self, deployment: &DeploymentId) -> Result<Option<Snapshot>, StoreError> {
        let path = self.snapshot_path(deployment);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Aggregate statistics over the trailing window, as of now.
    pub fn statistics(
        &self,
        environment: Environment,
        window_days: u32,
    ) -> Result<DeploymentStatistics, StoreError> {
        self.statistics_at(environment, window_days, Utc::now())
    }

    /// Deterministic variant: same history and same `now` give the same
    /// statistics.
    pub fn statistics_at(
        &self,
        environment: Environment,
        window_days: u32,
        now: chrono::DateTime<Utc>,
    ) -> Result<DeploymentStatistics, StoreError> {
        let entries = self.history(Some(environment), self.max_history)?;
        Ok(stats::compute(&entries, window_days, now))
    }

    /// Scheduling patterns over a 90-day window.
    pub fn analyze_patterns(&self, environment: Environment) -> Result<PatternReport, StoreError> {
        let entries = self.history(Some(environment), self.max_history)?;
        let statistics = stats::compute(&entries, 90, Utc::now());
        Ok(stats::analyze(&entries, &statistics))
    }

    // ---- internals ----

    fn save(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();

        write_atomic(&self.record_path(&record.id), &serde_json::to_vec_pretty(record)?)?;

        // Upsert the history index and enforce retention.
        let mut entries = self.load_history()?;
        entries.retain(|e| e.id != record.id);
        entries.push(HistoryEntry::from(record));
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        entries.truncate(self.max_history);

        write_atomic(
            &self.root.join(HISTORY_FILENAME),
            &serde_json::to_vec_pretty(&entries)?,
        )?;
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let path = self.root.join(HISTORY_FILENAME);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn prune_snapshots(&self) -> Result<(), StoreError> {
        let dir = self.root.join(SNAPSHOTS_DIR);
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push((entry.metadata()?.modified()?, path));
            }
        }
        files.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, path) in files.into_iter().skip(self.snapshot_retention) {
            tracing::debug!(path = %path.display(), "pruning old snapshot");
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn record_path(&self, id: &DeploymentId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn snapshot_path(&self, deployment: &DeploymentId) -> PathBuf {
        self.root
            .join(SNAPSHOTS_DIR)
            .join(format!("snapshot-{deployment}.json"))
    }
}

/// Write via temp file + rename so readers never observe a torn document.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}
