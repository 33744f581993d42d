// ABOUTME: Error types for rollback execution.
// ABOUTME: Verification failure carries the individual checks for operator review.

use crate::store::{StoreError, VerificationCheck};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RollbackError {
    /// Resources were restored but the environment did not come back healthy.
    /// The deployment record stays `failed`.
    #[error("rollback verification failed: {}", summarize(.checks))]
    VerificationFailed { checks: Vec<VerificationCheck> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn summarize(checks: &[VerificationCheck]) -> String {
    let failed: Vec<&str> = checks
        .iter()
        .filter(|c| !c.success)
        .map(|c| c.name.as_str())
        .collect();
    failed.join(", ")
}
