// ABOUTME: Error types for deployment state persistence.
// ABOUTME: Invalid status transitions and missing rollback targets are explicit variants.

use crate::store::record::DeploymentStatus;
use crate::types::Environment;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deployment record not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("no successful deployment to roll back to in {0}")]
    NoRollbackTarget(Environment),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
