// ABOUTME: Mock cloud provider and stage pipeline with scriptable failures.
// ABOUTME: Both record every call so tests can assert on what actually ran.

use async_trait::async_trait;
use parking_lot::Mutex;
use stagehand::agent::{DeployPipeline, StageError, StageName, StageOutput};
use stagehand::config::ResolvedConfig;
use stagehand::provider::{
    CloudProvider, ErrorClass, HealthStatus, ProviderError, ResourceKind,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

fn resource_key(kind: ResourceKind, id: &str) -> String {
    format!("{kind}:{id}")
}

/// A cloud provider backed by in-memory state. Healthy and complete by
/// default; tests script missing resources, capture/restore failures, and
/// unhealthy endpoints.
#[derive(Default)]
pub struct MockProvider {
    missing: Mutex<HashSet<String>>,
    capture_failures: Mutex<HashSet<ResourceKind>>,
    restore_failures: Mutex<HashSet<ResourceKind>>,
    unhealthy: Mutex<HashSet<String>>,
    pub restored: Mutex<Vec<(ResourceKind, String)>>,
    pub invalidated: Mutex<Vec<(ResourceKind, String)>>,
    pub health_checked: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_missing(&self, kind: ResourceKind, id: &str) {
        self.missing.lock().insert(resource_key(kind, id));
    }

    pub fn mark_present(&self, kind: ResourceKind, id: &str) {
        self.missing.lock().remove(&resource_key(kind, id));
    }

    pub fn fail_capture(&self, kind: ResourceKind) {
        self.capture_failures.lock().insert(kind);
    }

    pub fn fail_restore(&self, kind: ResourceKind) {
        self.restore_failures.lock().insert(kind);
    }

    /// Any URL containing `fragment` reports unhealthy.
    pub fn mark_unhealthy(&self, fragment: &str) {
        self.unhealthy.lock().insert(fragment.to_string());
    }

    pub fn mark_all_healthy(&self) {
        self.unhealthy.lock().clear();
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn exists(&self, kind: ResourceKind, id: &str) -> Result<bool, ProviderError> {
        Ok(!self.missing.lock().contains(&resource_key(kind, id)))
    }

    async fn capture_state(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        if self.capture_failures.lock().contains(&kind) {
            return Err(ProviderError::Other(format!("cannot describe {kind} {id}")));
        }
        Ok(serde_json::json!({ "kind": kind.as_str(), "id": id, "version": "captured" }))
    }

    async fn restore(
        &self,
        kind: ResourceKind,
        id: &str,
        _descriptor: &serde_json::Value,
    ) -> Result<String, ProviderError> {
        if self.restore_failures.lock().contains(&kind) {
            return Err(ProviderError::Other(format!("restore of {kind} {id} failed")));
        }
        self.restored.lock().push((kind, id.to_string()));
        Ok(format!("restored {kind} {id}"))
    }

    async fn invalidate(&self, kind: ResourceKind, id: &str) -> Result<String, ProviderError> {
        self.invalidated.lock().push((kind, id.to_string()));
        Ok(format!("invalidation created for {id}"))
    }

    async fn check_health(&self, url: &str, _timeout: Duration) -> HealthStatus {
        self.health_checked.lock().push(url.to_string());
        let unhealthy = self.unhealthy.lock().iter().any(|f| url.contains(f));
        if unhealthy {
            HealthStatus::unhealthy(format!("{url} returned 503"))
        } else {
            HealthStatus::healthy(200)
        }
    }
}

/// A stage pipeline with scripted failures. Each scripted failure is
/// consumed once, so "fail once then succeed" is the natural shape for
/// recovery tests.
pub struct MockPipeline {
    failures: Arc<Mutex<HashMap<StageName, VecDeque<StageError>>>>,
    stage_delay: Option<Duration>,
    runs: Arc<Mutex<Vec<String>>>,
}

/// Shared handle for scripting failures after the pipeline has moved into
/// the orchestrator.
#[derive(Clone)]
pub struct FailureScript(Arc<Mutex<HashMap<StageName, VecDeque<StageError>>>>);

impl FailureScript {
    pub fn fail_once(&self, stage: StageName, class: ErrorClass, message: &str) {
        self.0
            .lock()
            .entry(stage)
            .or_default()
            .push_back(StageError::new(class, message));
    }
}

impl MockPipeline {
    pub fn happy() -> Self {
        Self {
            failures: Arc::new(Mutex::new(HashMap::new())),
            stage_delay: None,
            runs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fail_once(self, stage: StageName, class: ErrorClass, message: &str) -> Self {
        self.failures
            .lock()
            .entry(stage)
            .or_default()
            .push_back(StageError::new(class, message));
        self
    }

    pub fn failure_script(&self) -> FailureScript {
        FailureScript(Arc::clone(&self.failures))
    }

    /// Slow every stage down, for concurrency tests.
    pub fn with_stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = Some(delay);
        self
    }

    /// Handle onto the run log, usable after the pipeline moves into the
    /// orchestrator.
    pub fn runs_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.runs)
    }
}

#[async_trait]
impl DeployPipeline for MockPipeline {
    async fn run_stage(
        &self,
        stage: StageName,
        _config: &ResolvedConfig,
    ) -> Result<StageOutput, StageError> {
        self.runs.lock().push(stage.as_str().to_string());
        if let Some(delay) = self.stage_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self
            .failures
            .lock()
            .get_mut(&stage)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let mut output = StageOutput::with_details(serde_json::json!({ "ok": true }));
        match stage {
            StageName::DeployFrontend => {
                output
                    .artifacts
                    .insert("bucket".to_string(), serde_json::json!({ "version": "new" }));
            }
            StageName::DeployBackend => {
                output.artifacts.insert(
                    "function".to_string(),
                    serde_json::json!({ "version": "new" }),
                );
            }
            _ => {}
        }
        Ok(output)
    }
}
