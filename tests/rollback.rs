// ABOUTME: Integration tests for snapshot capture and rollback execution.
// ABOUTME: Partial snapshots, verification gating, and concurrent restores.

mod support;

use stagehand::provider::ResourceKind;
use stagehand::rollback::{RollbackError, RollbackExecutor};
use stagehand::store::{
    DeploymentStatus, Metadata, StateStore, StoreError, UpdateFields,
};
use stagehand::types::Environment;
use std::collections::BTreeMap;
use std::sync::Arc;
use support::fixtures::staging_config;
use support::mocks::MockProvider;

fn executor(
    dir: &tempfile::TempDir,
) -> (RollbackExecutor<MockProvider>, Arc<StateStore>, Arc<MockProvider>) {
    let store = Arc::new(StateStore::new(dir.path().join("state")).expect("store init"));
    let provider = MockProvider::new();
    let executor = RollbackExecutor::new(Arc::clone(&provider), Arc::clone(&store));
    (executor, store, provider)
}

/// A completed deployment carrying restorable artifacts, followed by a
/// failed one. The standard precondition for a rollback.
fn seed_failed_after_success(store: &StateStore) -> stagehand::types::DeploymentId {
    let config = staging_config();
    let good = store
        .create(
            Environment::Staging,
            config.sanitized(),
            config.fingerprint(),
            Metadata::default(),
        )
        .expect("create good");
    let mut fields = UpdateFields::status(DeploymentStatus::Completed);
    fields.artifacts = BTreeMap::from([
        ("bucket".to_string(), serde_json::json!({"version": "good"})),
        ("function".to_string(), serde_json::json!({"version": "good"})),
        ("gateway".to_string(), serde_json::json!({"stage": "staging"})),
    ]);
    store.update(&good.id, fields).expect("complete good");

    let bad = store
        .create(
            Environment::Staging,
            config.sanitized(),
            config.fingerprint(),
            Metadata::default(),
        )
        .expect("create bad");
    store
        .update(&bad.id, UpdateFields::status(DeploymentStatus::Failed))
        .expect("fail bad");
    bad.id
}

#[tokio::test]
async fn capture_failure_degrades_to_partial_snapshot() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (executor, store, provider) = executor(&dir);
    let config = staging_config();

    provider.fail_capture(ResourceKind::Function);

    let record = store
        .create(
            Environment::Staging,
            config.sanitized(),
            config.fingerprint(),
            Metadata::default(),
        )
        .unwrap();
    executor.capture_snapshot(&record.id, &config).await.unwrap();

    let snapshot = store.load_snapshot(&record.id).unwrap().unwrap();
    assert!(snapshot.resources.contains_key("bucket"));
    assert!(snapshot.resources.contains_key("gateway"));
    assert!(
        !snapshot.resources.contains_key("function"),
        "failed capture is simply absent"
    );
}

#[tokio::test]
async fn successful_rollback_marks_record_and_invalidates_cdn() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (executor, store, provider) = executor(&dir);
    let config = staging_config();
    let failed_id = seed_failed_after_success(&store);

    let report = executor
        .rollback(&failed_id, &config, "test rollback")
        .await
        .expect("rollback succeeds");

    assert!(report.results.values().all(|r| r.success));
    assert_eq!(report.checks.len(), 2, "frontend and api both verified");

    let record = store.load(&failed_id).unwrap();
    assert_eq!(record.status, DeploymentStatus::RolledBack);
    let info = record.rollback_info.expect("rollback info recorded");
    assert_eq!(info.reason, "test rollback");

    // Bucket and function restored; the CDN only gets an invalidation.
    let restored = provider.restored.lock().clone();
    assert!(restored.iter().any(|(k, _)| *k == ResourceKind::Bucket));
    assert!(restored.iter().any(|(k, _)| *k == ResourceKind::Function));
    assert!(!restored.iter().any(|(k, _)| *k == ResourceKind::Cdn));
    assert_eq!(provider.invalidated.lock().len(), 1);
}

#[tokio::test]
async fn failed_verification_keeps_record_failed() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (executor, store, provider) = executor(&dir);
    let config = staging_config();
    let failed_id = seed_failed_after_success(&store);

    provider.mark_unhealthy("staging.example.com");

    let err = executor
        .rollback(&failed_id, &config, "test rollback")
        .await
        .unwrap_err();
    match err {
        RollbackError::VerificationFailed { checks } => {
            assert!(checks.iter().any(|c| !c.success));
        }
        other => panic!("expected VerificationFailed, got {other:?}"),
    }

    let record = store.load(&failed_id).unwrap();
    assert_eq!(
        record.status,
        DeploymentStatus::Failed,
        "verification failure must not mark the record rolled back"
    );

    // Once the environment is healthy again the same rollback goes through.
    provider.mark_all_healthy();
    executor
        .rollback(&failed_id, &config, "second attempt")
        .await
        .expect("rollback after recovery");
    let record = store.load(&failed_id).unwrap();
    assert_eq!(record.status, DeploymentStatus::RolledBack);
}

#[tokio::test]
async fn single_resource_failure_does_not_stop_the_others() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (executor, store, provider) = executor(&dir);
    let config = staging_config();
    let failed_id = seed_failed_after_success(&store);

    provider.fail_restore(ResourceKind::Function);

    let err = executor
        .rollback(&failed_id, &config, "test rollback")
        .await;
    // Verification still passes (mock endpoints are healthy), so the
    // rollback reports success with a failed function outcome recorded.
    let report = err.expect("partial restore still verifies");
    assert!(!report.results["function"].success);
    assert!(report.results["bucket"].success);
}

#[tokio::test]
async fn rollback_without_prior_success_is_refused() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (executor, store, _provider) = executor(&dir);
    let config = staging_config();

    let record = store
        .create(
            Environment::Staging,
            config.sanitized(),
            config.fingerprint(),
            Metadata::default(),
        )
        .unwrap();
    store
        .update(&record.id, UpdateFields::status(DeploymentStatus::Failed))
        .unwrap();

    let err = executor
        .rollback(&record.id, &config, "test rollback")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RollbackError::Store(StoreError::NoRollbackTarget(Environment::Staging))
    ));
}

#[tokio::test]
async fn list_targets_returns_completed_deployments_only() {
    let dir = tempfile::tempdir().unwrap();
    let (executor, store, _provider) = executor(&dir);
    let _failed_id = seed_failed_after_success(&store);

    let targets = executor.list_targets(Environment::Staging, 10).unwrap();
    assert_eq!(targets.len(), 1);
}
