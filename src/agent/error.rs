// ABOUTME: Top-level deployment errors returned by the orchestrator.
// ABOUTME: Stage failures keep their classification; store/rollback errors pass through.

use super::pipeline::{StageError, StageName};
use crate::config::ConfigError;
use crate::rollback::RollbackError;
use crate::store::StoreError;
use crate::types::Environment;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("a deployment to {0} is already in progress")]
    AlreadyInProgress(Environment),

    /// Risk score exceeded the hard limit; the record was marked failed
    /// before anything remote was touched.
    #[error("deployment aborted: risk score {score:.2} ({})", .factors.join("; "))]
    HighRiskAbort { score: f64, factors: Vec<String> },

    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: StageName,
        #[source]
        source: StageError,
    },

    #[error("deployment cancelled before stage {0}")]
    Cancelled(StageName),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),
}
