// src/lib.rs

pub mod assemble;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod monitor;
pub mod record;
pub mod snapshot;
pub mod submission;
pub mod types;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::assemble::{build_command, feeder_file_name, render_feeder};
use crate::cli::CliArgs;
use crate::config::{EngineConfig, load_or_default};
use crate::engine::{BatchEngine, StatusReport};
use crate::errors::EngineError;
use crate::submission::SubmissionSpec;
use crate::types::{ExecutionId, ExecutionStatus};

const WAIT_POLL: Duration = Duration::from_millis(500);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - submission files
/// - the batch engine
/// - Ctrl-C handling
/// - waiting for every execution and reporting the outcome
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(args.config.as_deref())?;
    let specs = load_specs(&args.specs)?;

    if args.dry_run {
        print_dry_run(&cfg, &specs)?;
        return Ok(());
    }

    let engine = BatchEngine::from_config(&cfg);

    let mut ids = Vec::new();
    let mut rejected = 0usize;
    for (path, spec) in specs {
        match engine.submit(spec).await {
            Ok(receipt) => {
                info!(
                    spec = ?path,
                    execution_id = %receipt.execution_id,
                    estimated_minutes = receipt.estimated_duration_minutes,
                    "{}",
                    receipt.message
                );
                ids.push(receipt.execution_id);
            }
            Err(e) => {
                error!(spec = ?path, error = %e, "submission rejected");
                rejected += 1;
            }
        }
    }

    // Ctrl-C -> cancel everything still running.
    {
        let engine = engine.clone();
        let ids = ids.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling executions");
            for id in &ids {
                match engine.cancel(id).await {
                    Ok(cancelled) => debug!(execution_id = %id, cancelled, "cancel on Ctrl+C"),
                    Err(e) => warn!(execution_id = %id, error = %e, "cancel on Ctrl+C failed"),
                }
            }
        });
    }

    let reports = wait_for_all(&engine, &ids, args.status_every).await?;
    engine.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&reports)?);

    let unfinished = rejected
        + (ids.len() - reports.len())
        + reports
            .iter()
            .filter(|r| r.status != ExecutionStatus::Completed)
            .count();
    if unfinished > 0 {
        bail!(
            "{unfinished} of {} execution(s) did not complete",
            ids.len() + rejected
        );
    }
    Ok(())
}

fn load_specs(paths: &[PathBuf]) -> Result<Vec<(PathBuf, SubmissionSpec)>> {
    paths
        .iter()
        .map(|path| {
            let spec = SubmissionSpec::from_path(path)
                .with_context(|| format!("loading submission {:?}", path))?;
            Ok((path.clone(), spec))
        })
        .collect()
}

/// Poll until every execution is terminal, logging a status line for each
/// live one every `status_every`.
///
/// A terminal report is kept as soon as it is seen, so later eviction from
/// the engine's history does not lose it. An execution evicted before its
/// terminal report was ever seen is left out of the result.
pub async fn wait_for_all(
    engine: &BatchEngine,
    ids: &[ExecutionId],
    status_every: Duration,
) -> Result<Vec<StatusReport>> {
    let tick = WAIT_POLL.min(status_every).max(Duration::from_millis(10));
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_status_log = Instant::now();

    let mut finished: HashMap<ExecutionId, StatusReport> = HashMap::new();
    let mut pending: Vec<ExecutionId> = ids.to_vec();

    while !pending.is_empty() {
        ticker.tick().await;

        let mut live = Vec::new();
        let mut still_pending = Vec::with_capacity(pending.len());
        for id in pending {
            match engine.status(&id).await {
                Ok(report) if report.is_terminal() => {
                    finished.insert(id, report);
                }
                Ok(report) => {
                    live.push(report);
                    still_pending.push(id);
                }
                Err(EngineError::NotFound(_)) => {
                    warn!(execution_id = %id, "execution left the history before its result was seen");
                }
                Err(e) => return Err(e.into()),
            }
        }
        pending = still_pending;

        if last_status_log.elapsed() >= status_every {
            last_status_log = Instant::now();
            for report in &live {
                info!(
                    execution_id = %report.execution_id.short(),
                    status = %report.status,
                    percentage = report.percentage,
                    requests = report.total_requests,
                    "{}",
                    report.message
                );
            }
        }
    }

    Ok(ids.iter().filter_map(|id| finished.remove(id)).collect())
}

/// Print what would be run for each submission without running it.
fn print_dry_run(cfg: &EngineConfig, specs: &[(PathBuf, SubmissionSpec)]) -> Result<()> {
    println!("loadbatch dry-run");
    println!("  tool.working_dir = {:?}", cfg.tool.working_dir);
    println!("  tool.feeder_dir = {:?}", cfg.tool.feeder_path());
    println!("  monitor.log_dir = {:?}", cfg.log_dir);
    println!();

    let placeholder = ExecutionId::new("dry-run");
    for (path, spec) in specs {
        spec.validate()
            .with_context(|| format!("validating submission {:?}", path))?;

        let command = build_command(spec, &cfg.tool, &feeder_file_name(&placeholder));
        println!("{}:", path.display());
        println!("  estimated duration: {} min", spec.estimated_duration_minutes());
        println!("  command: {command}");
        println!("  feeder:");
        for line in render_feeder(&spec.endpoints)?.lines() {
            println!("    {line}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
