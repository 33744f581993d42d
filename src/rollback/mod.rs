// ABOUTME: Rollback execution: snapshot capture, concurrent resource restore, verification.
// ABOUTME: A rollback only counts as successful once the environment verifies healthy.

mod error;
mod executor;

pub use error::RollbackError;
pub use executor::{named_resources, RollbackCandidate, RollbackExecutor, RollbackReport};
