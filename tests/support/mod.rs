// ABOUTME: Test support utilities.
// ABOUTME: Mock provider/pipeline and config fixtures for integration tests.

use std::sync::Once;

#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod mocks;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("stagehand=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}
