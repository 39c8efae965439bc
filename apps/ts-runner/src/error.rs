//! Error types for ts-runner.

use thiserror::Error;

use ts_core::TsError;
use ts_output::OutputError;
use ts_sim::SimError;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config version {found} is not supported (expected {expected})")]
    Version { expected: u32, found: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Settings(#[from] TsError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("could not build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("post-processing step {command:?} failed: {status}")]
    Post { command: String, status: String },

    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("no run in progress")]
    NoActiveRun,

    #[error("no result named {0:?}")]
    UnknownResult(String),
}

/// Alias for `Result<T, RunnerError>`.
pub type RunnerResult<T> = Result<T, RunnerError>;
