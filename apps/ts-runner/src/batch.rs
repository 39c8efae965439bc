//! Batch execution: every expanded run on a rayon pool, one JSONL file per
//! run, then the configured post-processing commands.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Local;
use rayon::prelude::*;
use serde::Serialize;

use ts_output::{JsonlWriter, LogFilter, SimLogObserver, create_run_dir, log_directory_name, run_log_path};
use ts_sim::{RunOutcome, SimBuilder, SimObserver};

use crate::config::{ConfigFile, RunSpec};
use crate::{RunnerError, RunnerResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Finished,
    Aborted,
    Failed,
}

/// How one run ended.
#[derive(Clone, Debug, Serialize)]
pub struct RunStatus {
    pub run_id:   usize,
    pub state:    RunState,
    /// ASN the run stopped at.
    pub last_asn: u64,
    /// Failure message, or the panic payload of a crashed run.
    pub error:    Option<String>,
    pub log_file: Option<PathBuf>,
}

impl RunStatus {
    pub fn failed(run_id: usize, error: String) -> Self {
        RunStatus { run_id, state: RunState::Failed, last_asn: 0, error: Some(error), log_file: None }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub log_dir: PathBuf,
    pub runs:    Vec<RunStatus>,
}

impl BatchReport {
    pub fn num_failed(&self) -> usize {
        self.runs.iter().filter(|r| r.state == RunState::Failed).count()
    }
}

/// Run a whole config under `base` (logs land in `base/simData/<name>/`).
pub fn run_batch(config: &ConfigFile, base: &Path) -> RunnerResult<BatchReport> {
    let runs = config.expand_runs()?;
    let name = log_directory_name(&config.log_directory_name, Local::now());
    let log_dir = create_run_dir(base, &name)?;

    let threads = config.execution.worker_threads().min(runs.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    tracing::info!(runs = runs.len(), threads, dir = %log_dir.display(), "batch started");

    let statuses: Vec<RunStatus> =
        pool.install(|| runs.par_iter().map(|run| run_guarded(run, &log_dir, &config.logging)).collect());

    let report = BatchReport { log_dir, runs: statuses };
    tracing::info!(failed = report.num_failed(), "batch finished");

    for command in &config.post {
        run_post(command, &report.log_dir)?;
    }
    Ok(report)
}

/// Run one expanded run, turning errors and panics into a `Failed` status.
pub fn run_guarded(run: &RunSpec, log_dir: &Path, filter: &LogFilter) -> RunStatus {
    let result = catch_unwind(AssertUnwindSafe(|| run_to_file(run, log_dir, filter)));
    match result {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            tracing::error!(run = run.run_id, error = %e, "run failed");
            RunStatus::failed(run.run_id, e.to_string())
        }
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::error!(run = run.run_id, panic = %msg, "run panicked");
            RunStatus::failed(run.run_id, format!("panic: {msg}"))
        }
    }
}

fn run_to_file(run: &RunSpec, log_dir: &Path, filter: &LogFilter) -> RunnerResult<RunStatus> {
    let path = run_log_path(log_dir, run.run_id);
    let writer = JsonlWriter::create(&path)?;
    let mut observer = SimLogObserver::new(writer, filter.clone());
    let mut status = run_with(run, &mut observer)?;
    if let Some(e) = observer.take_error() {
        return Err(e.into());
    }
    status.log_file = Some(path);
    Ok(status)
}

/// Build and run `run` to completion against any observer.
pub fn run_with<O: SimObserver>(run: &RunSpec, observer: &mut O) -> RunnerResult<RunStatus> {
    let mut sim = SimBuilder::new(run.settings.clone()).build()?;
    let outcome = sim.run(observer)?;
    let state = match outcome {
        RunOutcome::Finished => RunState::Finished,
        RunOutcome::Aborted | RunOutcome::Paused(_) => RunState::Aborted,
    };
    Ok(RunStatus { run_id: run.run_id, state, last_asn: sim.current_asn().0, error: None, log_file: None })
}

fn run_post(command: &str, dir: &Path) -> RunnerResult<()> {
    tracing::info!(command, "post-processing");
    let status = Command::new("sh").arg("-c").arg(command).current_dir(dir).status()?;
    if !status.success() {
        return Err(RunnerError::Post { command: command.to_string(), status: status.to_string() });
    }
    Ok(())
}
