pub mod builders;
pub mod scripted;

use std::sync::Once;
use std::time::Duration;

use loadbatch::engine::{BatchEngine, StatusReport};
use loadbatch::types::ExecutionId;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=loadbatch=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Poll `status` until the execution is terminal.
pub async fn wait_terminal(engine: &BatchEngine, id: &ExecutionId) -> StatusReport {
    with_timeout(async {
        loop {
            let report = engine.status(id).await.expect("status of submitted execution");
            if report.is_terminal() {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
}

/// Poll `status` until `pred` holds.
pub async fn wait_until<P>(engine: &BatchEngine, id: &ExecutionId, mut pred: P) -> StatusReport
where
    P: FnMut(&StatusReport) -> bool,
{
    with_timeout(async {
        loop {
            let report = engine.status(id).await.expect("status of submitted execution");
            if pred(&report) {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
}
