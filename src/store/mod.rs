// ABOUTME: Deployment state persistence: records, history index, snapshots, statistics.
// ABOUTME: StateStore is the single writer; everything it writes is plain JSON on disk.

mod error;
mod record;
mod state;
mod stats;

pub use error::StoreError;
pub use record::{
    DeploymentRecord, DeploymentStatus, HistoryEntry, Metadata, Metrics, RecordedError,
    ResourceOutcome, RiskAnalysis, RollbackInfo, RollbackTarget, Snapshot, StageRecord,
    StageStatus, UpdateFields, VerificationCheck,
};
pub use state::StateStore;
pub use stats::{DeploymentStatistics, PatternReport};
