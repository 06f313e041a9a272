// tests/engine_scenarios.rs
//
// End-to-end runs with `sh -c` scripts standing in for the load tool.
#![cfg(unix)]

use std::time::Duration;

use loadbatch::engine::BatchEngine;
use loadbatch::errors::EngineError;
use loadbatch::record::PersistedExecution;
use loadbatch::types::{ExecutionId, ExecutionStatus};
use loadbatch_test_utils::builders::{minimal_spec, ShToolConfigBuilder, SubmissionSpecBuilder};
use loadbatch_test_utils::{init_tracing, wait_terminal, wait_until, with_timeout};

const HAPPY_PATH: &str = r#"
case "$*" in *-Dvu=1*) ;; *) echo "[ERROR] missing -Dvu" ; exit 3 ;; esac
echo "Simulation example.UniversalSimulation started..."
echo "[#####     ] 50.0%"
echo "waiting: 0 / active: 1 / done: 0"
echo "> Global                                                   |        10 |         9 |         1"
echo "> mean response time (ms)                                  |        42"
echo "Parsing log file(s)..."
echo "Generating reports..."
echo "Reports generated, please open the following file: /tmp/reports/index.html"
"#;

#[tokio::test]
async fn scenario_a_completion_line_completes_execution() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let records = dir.path().join("executions.jsonl");
    let cfg = ShToolConfigBuilder::new(dir.path(), HAPPY_PATH)
        .record_file(&records)
        .build();
    let engine = BatchEngine::from_config(&cfg);

    let receipt = engine.submit(minimal_spec()).await.unwrap();
    assert_eq!(receipt.status, ExecutionStatus::Submitted);
    assert_eq!(receipt.estimated_duration_minutes, 1);

    let report = wait_terminal(&engine, &receipt.execution_id).await;
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.report_path.as_deref(), Some("/tmp/reports/index.html"));
    assert_eq!(report.percentage, 100.0);
    assert_eq!(report.total_requests, 10);
    assert_eq!(report.failed_requests, 1);
    assert_eq!(report.mean_response_time_ms, 42.0);
    assert!(report.completed_at.is_some());

    let feeder = dir
        .path()
        .join("feeders")
        .join(format!("endpoints_{}.csv", receipt.execution_id));
    assert!(feeder.is_file());

    let rows: Vec<PersistedExecution> = std::fs::read_to_string(&records)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let statuses: Vec<_> = rows.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![ExecutionStatus::Submitted, ExecutionStatus::Completed]);
    assert_eq!(rows[1].report_path.as_deref(), Some("/tmp/reports/index.html"));
}

#[tokio::test]
async fn scenario_b_nonzero_exit_fails_execution() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
echo "Simulation example.UniversalSimulation started..."
echo "[ERROR] connection refused"
exit 2
"#;
    let cfg = ShToolConfigBuilder::new(dir.path(), script).build();
    let engine = BatchEngine::from_config(&cfg);

    let receipt = engine.submit(minimal_spec()).await.unwrap();
    let report = wait_terminal(&engine, &receipt.execution_id).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    let error = report.error_message.expect("failed execution carries an error");
    assert!(error.contains("status 2"), "unexpected error: {error}");
    assert!(report.report_path.is_none());
}

#[tokio::test]
async fn scenario_c_cancel_terminates_process() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("tool.pid");
    let script = format!(
        "echo $$ > '{}'\necho 'Simulation example.UniversalSimulation started...'\nsleep 30\n",
        pid_file.display()
    );
    let cfg = ShToolConfigBuilder::new(dir.path(), &script).build();
    let engine = BatchEngine::from_config(&cfg);

    let receipt = engine.submit(minimal_spec()).await.unwrap();
    let id = receipt.execution_id;

    // Wait for the tool to be observably running, then cancel well within 1s.
    wait_until(&engine, &id, |r| r.status == ExecutionStatus::Running).await;
    let cancelled = with_timeout(engine.cancel(&id)).await.unwrap();
    assert!(cancelled);

    let report = engine.status(&id).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Cancelled);

    let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    let alive = unsafe { libc::kill(pid, 0) } == 0;
    assert!(!alive, "load tool process {pid} still alive after cancel");

    // Cancelling again is a no-op.
    assert!(!engine.cancel(&id).await.unwrap());
    assert_eq!(engine.status(&id).await.unwrap(), report);
}

#[tokio::test]
async fn scenario_d_unknown_id_is_not_found() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ShToolConfigBuilder::new(dir.path(), "exit 0").build();
    let engine = BatchEngine::from_config(&cfg);

    match engine.status(&ExecutionId::new("never-submitted")).await {
        Err(EngineError::NotFound(id)) => assert_eq!(id.as_str(), "never-submitted"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(!engine.cancel(&ExecutionId::new("never-submitted")).await.unwrap());
}

#[tokio::test]
async fn scenario_e_concurrent_executions_keep_their_own_metrics() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    // Each run reports request counts derived from its own -Dvu parameter.
    let script = r#"
for arg in "$@"; do
  case "$arg" in -Dvu=*) vu="${arg#-Dvu=}" ;; esac
done
echo "Simulation example.UniversalSimulation started..."
sleep 0.2
echo "> Global                                                   |        $vu |        $vu |         0"
echo "Reports generated, please open the following file: /reports/$vu/index.html"
"#;
    let cfg = ShToolConfigBuilder::new(dir.path(), script).build();
    let engine = BatchEngine::from_config(&cfg);

    let spec = |vu| {
        SubmissionSpecBuilder::new("http://localhost:8080")
            .endpoint("health", "/health")
            .virtual_users(vu)
            .duration_seconds(1)
            .build()
    };
    let (a, b) = tokio::join!(engine.submit(spec(3)), engine.submit(spec(7)));
    let (a, b) = (a.unwrap().execution_id, b.unwrap().execution_id);
    assert_ne!(a, b);

    let (ra, rb) = tokio::join!(wait_terminal(&engine, &a), wait_terminal(&engine, &b));
    assert_eq!(ra.status, ExecutionStatus::Completed);
    assert_eq!(rb.status, ExecutionStatus::Completed);
    assert_eq!((ra.total_requests, ra.successful_requests), (3, 3));
    assert_eq!((rb.total_requests, rb.successful_requests), (7, 7));
    assert_eq!(ra.report_path.as_deref(), Some("/reports/3/index.html"));
    assert_eq!(rb.report_path.as_deref(), Some("/reports/7/index.html"));
}

#[tokio::test]
async fn spawn_failure_leaves_no_record() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = ShToolConfigBuilder::new(dir.path(), "exit 0").build();
    cfg.tool.program = dir.path().join("no-such-tool").display().to_string();
    let engine = BatchEngine::from_config(&cfg);

    let err = engine.submit(minimal_spec()).await.unwrap_err();
    assert!(matches!(err, EngineError::LaunchFailed(_)), "got {err:?}");
    assert_eq!(engine.stats().await.unwrap().total, 0);

    // The feeder written for the failed launch is cleaned up.
    let leftovers = std::fs::read_dir(dir.path().join("feeders")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn invalid_submission_is_rejected_before_launch() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ShToolConfigBuilder::new(dir.path(), "exit 0").build();
    let engine = BatchEngine::from_config(&cfg);

    let spec = SubmissionSpecBuilder::new("http://localhost:8080").build();
    let err = engine.submit(spec).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSubmission(_)), "got {err:?}");
    assert_eq!(engine.list(10).await.unwrap().len(), 0);
}

#[tokio::test]
async fn shutdown_cancels_running_tools() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ShToolConfigBuilder::new(dir.path(), "echo 'Simulation x started'; sleep 30")
        .cancel_grace(Duration::from_millis(500))
        .build();
    let engine = BatchEngine::from_config(&cfg);

    let id = engine.submit(minimal_spec()).await.unwrap().execution_id;
    wait_until(&engine, &id, |r| r.status == ExecutionStatus::Running).await;

    with_timeout(engine.shutdown()).await.unwrap();
    assert!(matches!(engine.status(&id).await, Err(EngineError::EngineStopped)));
}

#[tokio::test]
async fn cancel_after_tool_exit_keeps_completion() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("exited");
    let script = format!(
        "echo 'Simulation example.UniversalSimulation started...'\ntouch '{}'\nexit 0\n",
        marker.display()
    );
    // The monitor only notices the exit through the cancel request.
    let cfg = ShToolConfigBuilder::new(dir.path(), &script)
        .idle_polls(1000)
        .build();
    let engine = BatchEngine::from_config(&cfg);

    let id = engine.submit(minimal_spec()).await.unwrap().execution_id;
    wait_until(&engine, &id, |r| r.status == ExecutionStatus::Running).await;
    with_timeout(async {
        while !marker.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!with_timeout(engine.cancel(&id)).await.unwrap());
    let report = engine.status(&id).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert!(report.completed_at.is_some());
    assert_eq!(engine.status(&id).await.unwrap(), report);
}

#[tokio::test]
async fn cancel_kills_tool_that_ignores_sigterm() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("tool.pid");
    let script = format!(
        "trap '' TERM\necho $$ > '{}'\necho 'Simulation example.UniversalSimulation started...'\nwhile :; do sleep 0.05; done\n",
        pid_file.display()
    );
    let grace = Duration::from_millis(300);
    let cfg = ShToolConfigBuilder::new(dir.path(), &script)
        .cancel_grace(grace)
        .build();
    let engine = BatchEngine::from_config(&cfg);

    let id = engine.submit(minimal_spec()).await.unwrap().execution_id;
    wait_until(&engine, &id, |r| r.status == ExecutionStatus::Running).await;

    let started = std::time::Instant::now();
    assert!(with_timeout(engine.cancel(&id)).await.unwrap());
    assert!(started.elapsed() >= grace, "cancel returned before the grace period");

    let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    let alive = unsafe { libc::kill(pid, 0) } == 0;
    assert!(!alive, "load tool process {pid} survived SIGKILL");

    let report = engine.status(&id).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn build_failure_wins_over_report_line() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
echo "Simulation example.UniversalSimulation started..."
echo "[INFO] BUILD FAILURE"
echo "Reports generated, please open the following file: /r/index.html"
exit 0
"#;
    let cfg = ShToolConfigBuilder::new(dir.path(), script).build();
    let engine = BatchEngine::from_config(&cfg);

    let id = engine.submit(minimal_spec()).await.unwrap().execution_id;
    let report = wait_terminal(&engine, &id).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    let error = report.error_message.expect("failed execution carries an error");
    assert!(error.contains("BUILD FAILURE"), "unexpected error: {error}");
    assert!(report.report_path.is_none());
}

#[tokio::test]
async fn failed_assertions_fail_execution() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
echo "Simulation example.UniversalSimulation started..."
case "$*" in *-DenableAssertions=true*) echo "Gatling simulation assertions failed !" ;; esac
echo "Reports generated, please open the following file: /r/index.html"
"#;
    let cfg = ShToolConfigBuilder::new(dir.path(), script).build();
    let engine = BatchEngine::from_config(&cfg);

    let spec = SubmissionSpecBuilder::new("https://api.example.com")
        .endpoint("health", "/health")
        .assertions(5.0, 1500.0)
        .build();
    let id = engine.submit(spec).await.unwrap().execution_id;
    let report = wait_terminal(&engine, &id).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    let error = report.error_message.expect("failed execution carries an error");
    assert!(error.contains("assertions failed"), "unexpected error: {error}");
    assert!(report.report_path.is_none());
}
