// ABOUTME: Core domain types shared across modules.
// ABOUTME: Typed IDs and the environment enum.

mod environment;
mod id;

pub use environment::Environment;
pub use id::{DeploymentId, Id, SnapshotId};
