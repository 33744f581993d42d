// ABOUTME: Library root for stagehand - deployment orchestration core.
// ABOUTME: Config resolution, state persistence, rollback, and the orchestrator.

pub mod agent;
pub mod config;
pub mod provider;
pub mod rollback;
pub mod store;
pub mod types;
