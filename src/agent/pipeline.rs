// ABOUTME: The fixed stage sequence and the pipeline trait that executes it.
// ABOUTME: Stage failures carry a classified error, never a bare message.

use crate::config::ResolvedConfig;
use crate::provider::ErrorClass;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The deployment stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Validate,
    Build,
    DeployFrontend,
    DeployBackend,
    HealthCheck,
}

impl StageName {
    /// Fixed execution order. Stages always run sequentially in this order.
    pub const ORDER: [StageName; 5] = [
        StageName::Validate,
        StageName::Build,
        StageName::DeployFrontend,
        StageName::DeployBackend,
        StageName::HealthCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Validate => "validate",
            StageName::Build => "build",
            StageName::DeployFrontend => "deploy_frontend",
            StageName::DeployBackend => "deploy_backend",
            StageName::HealthCheck => "health_check",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified stage failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    pub class: ErrorClass,
    pub message: String,
}

impl StageError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Timeout, message)
    }
}

/// What a completed stage produced: details recorded on the stage entry and
/// artifacts merged into the deployment record.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub details: serde_json::Value,
    /// Resource kind -> opaque descriptor sufficient to restore the resource.
    pub artifacts: BTreeMap<String, serde_json::Value>,
}

impl StageOutput {
    pub fn with_details(details: serde_json::Value) -> Self {
        Self {
            details,
            artifacts: BTreeMap::new(),
        }
    }
}

/// Executes one deployment stage. Implementations own the actual build and
/// upload mechanics; the orchestrator owns ordering, recording, recovery and
/// rollback.
#[async_trait]
pub trait DeployPipeline: Send + Sync {
    async fn run_stage(
        &self,
        stage: StageName,
        config: &ResolvedConfig,
    ) -> Result<StageOutput, StageError>;
}
