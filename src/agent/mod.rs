// ABOUTME: Deployment orchestration: risk scoring, prevention rules, stages, learning.
// ABOUTME: The orchestrator is the only entry point that mutates remote state.

mod error;
mod memory;
mod orchestrator;
mod pipeline;
mod risk;

pub use error::DeployError;
pub use memory::{ErrorKey, KnownError, Memory, Mitigation, PreventionRule, SuccessPattern};
pub use orchestrator::{DeployOptions, DeployOutcome, Orchestrator, OrchestratorSettings};
pub use pipeline::{DeployPipeline, StageError, StageName, StageOutput};
pub use risk::assess;
