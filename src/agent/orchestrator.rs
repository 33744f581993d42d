// ABOUTME: The deployment orchestrator: risk gate, prevention, stages, recovery, rollback.
// ABOUTME: One deployment per environment at a time; every step lands in the store.

use super::error::DeployError;
use super::memory::{Memory, Mitigation, PreventionRule};
use super::pipeline::{DeployPipeline, StageError, StageName, StageOutput};
use super::risk;
use crate::config::{ConfigLayer, ConfigRepository, ResolvedConfig};
use crate::provider::{CloudProvider, ErrorClass};
use crate::rollback::{named_resources, RollbackCandidate, RollbackExecutor, RollbackReport};
use crate::store::{
    DeploymentRecord, DeploymentStatus, Metadata, RecordedError, RiskAnalysis, StageStatus,
    StateStore, StoreError, UpdateFields,
};
use crate::types::{DeploymentId, Environment};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tunables for the orchestrator. Defaults match normal operation.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Scores above this produce a warning but the deployment proceeds.
    pub risk_threshold: f64,
    /// Scores above this abort the deployment before any mutation.
    pub hard_risk_limit: f64,
    pub learning_enabled: bool,
    /// Apply synthesized prevention rules before deploying.
    pub auto_prevent: bool,
    /// Trailing window used for the risk statistics.
    pub history_window_days: u32,
    pub stage_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            risk_threshold: 0.7,
            hard_risk_limit: 0.9,
            learning_enabled: true,
            auto_prevent: true,
            history_window_days: 7,
            stage_timeout: Duration::from_secs(600),
        }
    }
}

/// Per-call deployment options.
#[derive(Debug, Default)]
pub struct DeployOptions {
    /// Highest-priority config layer, merged over files and env overrides.
    pub overrides: Option<ConfigLayer>,
    /// Cooperative cancellation flag, checked between stages.
    pub cancel: Option<Arc<AtomicBool>>,
    pub metadata: Metadata,
}

/// A successful deployment: the final record and the risk assessment it ran
/// under.
#[derive(Debug)]
pub struct DeployOutcome {
    pub record: DeploymentRecord,
    pub risk: RiskAnalysis,
}

/// Drives a deployment end to end: config resolution, risk gating,
/// prevention rules, snapshot, the stage sequence with recovery, and
/// automatic rollback on failure.
pub struct Orchestrator<C: CloudProvider, P: DeployPipeline> {
    repo: ConfigRepository,
    store: Arc<StateStore>,
    provider: Arc<C>,
    pipeline: P,
    rollback: RollbackExecutor<C>,
    memory: Mutex<Memory>,
    in_flight: Mutex<HashSet<Environment>>,
    settings: OrchestratorSettings,
}

impl<C: CloudProvider, P: DeployPipeline> Orchestrator<C, P> {
    /// Build an orchestrator. Memory is rebuilt from the store's history so
    /// learned patterns survive process restarts.
    pub fn new(
        repo: ConfigRepository,
        store: Arc<StateStore>,
        provider: Arc<C>,
        pipeline: P,
        settings: OrchestratorSettings,
    ) -> Result<Self, StoreError> {
        let memory = Memory::rebuild(&store)?;
        let rollback = RollbackExecutor::new(Arc::clone(&provider), Arc::clone(&store));
        Ok(Self {
            repo,
            store,
            provider,
            pipeline,
            rollback,
            memory: Mutex::new(memory),
            in_flight: Mutex::new(HashSet::new()),
            settings,
        })
    }

    /// Run one deployment into `environment`.
    ///
    /// # Errors
    ///
    /// `AlreadyInProgress` when another deployment for the same environment
    /// is running; `HighRiskAbort` when the risk gate fires; `Stage` with
    /// the classified stage failure otherwise. On a stage failure with
    /// rollback enabled, exactly one automatic rollback is attempted before
    /// the stage error is returned.
    pub async fn deploy(
        &self,
        environment: Environment,
        options: DeployOptions,
    ) -> Result<DeployOutcome, DeployError> {
        let _flight = self.acquire_flight(environment)?;

        // Pre-flight: config problems never create a record.
        let mut config = self.repo.load(environment, options.overrides)?;
        let record = self.store.create(
            environment,
            config.sanitized(),
            config.fingerprint(),
            options.metadata,
        )?;
        let id = record.id.clone();
        tracing::debug!(%id, %environment, "deployment started");

        let risk = self.assess_risk(environment, &config).await?;
        self.store.update(
            &id,
            UpdateFields::default().with_risk_analysis(risk.clone()),
        )?;

        if risk.score > self.settings.hard_risk_limit {
            self.store.update(
                &id,
                UpdateFields::status(DeploymentStatus::Failed).with_error(RecordedError {
                    class: ErrorClass::Unknown,
                    message: format!("aborted by risk gate: score {:.2}", risk.score),
                    occurred_at: Utc::now(),
                }),
            )?;
            tracing::warn!(%id, score = risk.score, "deployment aborted by risk gate");
            return Err(DeployError::HighRiskAbort {
                score: risk.score,
                factors: risk.factors,
            });
        }
        if risk.score > self.settings.risk_threshold {
            tracing::warn!(%id, score = risk.score, factors = ?risk.factors, "elevated deployment risk, proceeding");
        }

        if self.settings.auto_prevent {
            self.apply_prevention_rules(&id, environment, &mut config)
                .await?;
        }

        self.rollback.capture_snapshot(&id, &config).await?;

        match self.run_stages(&id, &mut config, options.cancel.as_deref()).await {
            Ok(()) => {
                let record = self
                    .store
                    .update(&id, UpdateFields::status(DeploymentStatus::Completed))?;
                if self.settings.learning_enabled {
                    self.memory.lock().record_success(
                        environment,
                        &record.config_fingerprint,
                        record.metrics.duration_ms.unwrap_or(0),
                        Utc::now(),
                    );
                }
                tracing::debug!(%id, "deployment completed");
                Ok(DeployOutcome { record, risk })
            }
            Err(err) => self.handle_failure(&id, &config, err).await,
        }
    }

    /// Roll back the most recent failed deployment (or an explicit target)
    /// in `environment`.
    pub async fn manual_rollback(
        &self,
        environment: Environment,
        target: Option<DeploymentId>,
    ) -> Result<RollbackReport, DeployError> {
        let id = match target {
            Some(id) => id,
            None => self
                .store
                .history(Some(environment), usize::MAX)?
                .into_iter()
                .find(|e| e.status == DeploymentStatus::Failed)
                .map(|e| e.id)
                .ok_or(StoreError::NoRollbackTarget(environment))?,
        };
        let config = self.repo.load(environment, None)?;
        Ok(self.rollback.rollback(&id, &config, "manual rollback").await?)
    }

    pub fn list_rollback_targets(
        &self,
        environment: Environment,
        limit: usize,
    ) -> Result<Vec<RollbackCandidate>, StoreError> {
        self.rollback.list_targets(environment, limit)
    }

    // ---- internals ----

    fn acquire_flight(&self, environment: Environment) -> Result<FlightGuard<'_>, DeployError> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(environment) {
            return Err(DeployError::AlreadyInProgress(environment));
        }
        Ok(FlightGuard {
            environments: &self.in_flight,
            environment,
        })
    }

    async fn assess_risk(
        &self,
        environment: Environment,
        config: &ResolvedConfig,
    ) -> Result<RiskAnalysis, DeployError> {
        let resource_failures = self.probe_resources(config).await;
        let statistics = self
            .store
            .statistics(environment, self.settings.history_window_days)?;
        let last_successful = self.store.last_successful(environment)?;

        let memory = self.memory.lock();
        Ok(risk::assess(
            config,
            &memory,
            &statistics,
            last_successful.as_ref().map(|r| &r.config),
            &resource_failures,
            Utc::now(),
        ))
    }

    /// Check that every resource the config names actually exists.
    async fn probe_resources(&self, config: &ResolvedConfig) -> Vec<String> {
        let mut failures = Vec::new();
        for (kind, resource_id) in named_resources(config) {
            match self.provider.exists(kind, &resource_id).await {
                Ok(true) => {}
                Ok(false) => failures.push(format!("{kind} {resource_id} does not exist")),
                Err(err) => failures.push(format!("{kind} {resource_id}: {err}")),
            }
        }
        failures
    }

    /// Apply every matching prevention rule, best effort. Each application
    /// is recorded as a stage event; a failing rule is a warning, never a
    /// deployment failure.
    async fn apply_prevention_rules(
        &self,
        id: &DeploymentId,
        environment: Environment,
        config: &mut ResolvedConfig,
    ) -> Result<(), StoreError> {
        let rules: Vec<PreventionRule> = self
            .memory
            .lock()
            .matching_rules(environment)
            .into_iter()
            .cloned()
            .collect();

        for rule in rules {
            let applied = self.apply_mitigation(rule.mitigation, config).await;
            match &applied {
                Ok(summary) => {
                    self.store.add_stage(
                        id,
                        "prevention_rule_applied",
                        StageStatus::Completed,
                        serde_json::json!({
                            "rule": rule.name,
                            "mitigation": rule.mitigation.as_str(),
                            "summary": summary,
                        }),
                    )?;
                }
                Err(reason) => {
                    tracing::warn!(rule = %rule.name, reason = %reason, "prevention rule failed, continuing");
                }
            }
        }
        Ok(())
    }

    async fn apply_mitigation(
        &self,
        mitigation: Mitigation,
        config: &mut ResolvedConfig,
    ) -> Result<String, String> {
        match mitigation {
            Mitigation::EnsureResources => {
                let failures = self.probe_resources(config).await;
                if failures.is_empty() {
                    Ok("all named resources present".to_string())
                } else {
                    Err(failures.join(", "))
                }
            }
            Mitigation::TightenCors => {
                let before = config.backend.cors_origins.len();
                config.backend.cors_origins.retain(|origin| origin != "*");
                Ok(format!(
                    "removed {} wildcard origin(s)",
                    before - config.backend.cors_origins.len()
                ))
            }
            Mitigation::ExtendTimeouts => {
                config.deployment.health_timeout *= 2;
                config.deployment.health_check_grace *= 2;
                Ok("doubled health timeouts".to_string())
            }
        }
    }

    async fn run_stages(
        &self,
        id: &DeploymentId,
        config: &mut ResolvedConfig,
        cancel: Option<&AtomicBool>,
    ) -> Result<(), DeployError> {
        for stage in StageName::ORDER {
            if stage == StageName::HealthCheck && !config.deployment.health_check_enabled {
                tracing::debug!(%id, "health check disabled by policy, skipping");
                continue;
            }
            if let Some(flag) = cancel
                && flag.load(Ordering::Relaxed)
            {
                return Err(DeployError::Cancelled(stage));
            }

            self.store
                .add_stage(id, stage.as_str(), StageStatus::InProgress, serde_json::json!({}))?;

            match self.run_stage_once(stage, config).await {
                Ok(output) => self.record_stage_success(id, stage.as_str(), output)?,
                Err(original) => {
                    self.store.add_stage(
                        id,
                        stage.as_str(),
                        StageStatus::Failed,
                        serde_json::json!({
                            "error": original.message,
                            "error_class": original.class.as_str(),
                        }),
                    )?;

                    let recovered = match recovery_action(original.class, stage) {
                        Some(action) => self.try_recover(id, stage, action, config).await?,
                        None => false,
                    };
                    if !recovered {
                        return Err(DeployError::Stage {
                            stage,
                            source: original,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_stage_once(
        &self,
        stage: StageName,
        config: &ResolvedConfig,
    ) -> Result<StageOutput, StageError> {
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.settings.stage_timeout,
            self.pipeline.run_stage(stage, config),
        )
        .await;

        match result {
            Ok(Ok(mut output)) => {
                let elapsed = started.elapsed().as_millis() as u64;
                if let serde_json::Value::Object(map) = &mut output.details {
                    map.entry("duration_ms")
                        .or_insert_with(|| serde_json::json!(elapsed));
                }
                Ok(output)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(StageError::timeout(format!(
                "stage {stage} exceeded {:?}",
                self.settings.stage_timeout
            ))),
        }
    }

    /// Run the recovery action and retry the failed stage exactly once.
    /// A successful retry appends a `{stage}_recovery` entry; any failure
    /// along the way means the original error propagates.
    async fn try_recover(
        &self,
        id: &DeploymentId,
        stage: StageName,
        action: RecoveryAction,
        config: &mut ResolvedConfig,
    ) -> Result<bool, StoreError> {
        tracing::debug!(%id, %stage, action = action.as_str(), "attempting stage recovery");
        let ready = match action {
            RecoveryAction::EnsureResources => self.probe_resources(config).await.is_empty(),
            RecoveryAction::WaitAndRetry => {
                tokio::time::sleep(config.deployment.health_check_grace).await;
                true
            }
            RecoveryAction::TightenCors => {
                config.backend.cors_origins.retain(|origin| origin != "*");
                true
            }
        };
        if !ready {
            return Ok(false);
        }

        match self.run_stage_once(stage, config).await {
            Ok(output) => {
                let name = format!("{stage}_recovery");
                self.record_stage_success(id, &name, output)?;
                Ok(true)
            }
            Err(retry_err) => {
                tracing::warn!(%id, %stage, error = %retry_err, "stage retry failed after recovery");
                Ok(false)
            }
        }
    }

    fn record_stage_success(
        &self,
        id: &DeploymentId,
        name: &str,
        output: StageOutput,
    ) -> Result<(), StoreError> {
        self.store
            .add_stage(id, name, StageStatus::Completed, output.details)?;
        if !output.artifacts.is_empty() {
            let fields = UpdateFields {
                artifacts: output.artifacts,
                ..UpdateFields::default()
            };
            self.store.update(id, fields)?;
        }
        Ok(())
    }

    /// Record the failure, learn from it, and attempt one automatic
    /// rollback. The stage error is what the caller sees even when the
    /// rollback succeeds; a rollback failure replaces it.
    async fn handle_failure(
        &self,
        id: &DeploymentId,
        config: &ResolvedConfig,
        err: DeployError,
    ) -> Result<DeployOutcome, DeployError> {
        let (class, message) = classify(&err);
        self.store.update(
            id,
            UpdateFields::status(DeploymentStatus::Failed).with_error(RecordedError {
                class,
                message: message.clone(),
                occurred_at: Utc::now(),
            }),
        )?;

        if self.settings.learning_enabled {
            self.memory
                .lock()
                .record_failure(class, config.environment, Some(&message), Utc::now());
        }

        if config.deployment.rollback_on_failure {
            let reason = format!("automatic rollback: {message}");
            match self.rollback.rollback(id, config, &reason).await {
                Ok(report) => {
                    tracing::warn!(%id, target = %report.target, "deployment failed and was rolled back");
                }
                Err(rollback_err) => {
                    tracing::warn!(%id, error = %rollback_err, "automatic rollback failed");
                    return Err(rollback_err.into());
                }
            }
        }
        Err(err)
    }
}

fn classify(err: &DeployError) -> (ErrorClass, String) {
    match err {
        DeployError::Stage { source, .. } => (source.class, source.message.clone()),
        DeployError::Cancelled(stage) => (
            ErrorClass::Unknown,
            format!("cancelled before stage {stage}"),
        ),
        other => (ErrorClass::Unknown, other.to_string()),
    }
}

/// The recovery table: which (error class, stage) pairs have a known
/// recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecoveryAction {
    EnsureResources,
    WaitAndRetry,
    TightenCors,
}

impl RecoveryAction {
    fn as_str(self) -> &'static str {
        match self {
            RecoveryAction::EnsureResources => "ensure_resources",
            RecoveryAction::WaitAndRetry => "wait_and_retry",
            RecoveryAction::TightenCors => "tighten_cors",
        }
    }
}

fn recovery_action(class: ErrorClass, stage: StageName) -> Option<RecoveryAction> {
    match (class, stage) {
        (ErrorClass::ResourceNotFound, StageName::Validate | StageName::DeployFrontend) => {
            Some(RecoveryAction::EnsureResources)
        }
        (ErrorClass::Timeout, StageName::HealthCheck) => Some(RecoveryAction::WaitAndRetry),
        (ErrorClass::Cors, StageName::DeployBackend) => Some(RecoveryAction::TightenCors),
        _ => None,
    }
}

/// Releases the per-environment deployment slot on drop, whatever path the
/// deployment took.
struct FlightGuard<'a> {
    environments: &'a Mutex<HashSet<Environment>>,
    environment: Environment,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.environments.lock().remove(&self.environment);
    }
}
