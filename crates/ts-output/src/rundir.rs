//! Where a batch writes its logs: `simData/<name>/run_<k>.jsonl`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::OutputResult;

pub const DATA_DIR: &str = "simData";

/// The keyword replaced by the batch start time.
pub const START_TIME: &str = "startTime";

/// Resolve a `log_directory_name`.  `"startTime"` becomes the start time
/// formatted `YYYYmmdd-HHMMSS-fff`; anything else is taken literally.
pub fn log_directory_name(configured: &str, started: DateTime<Local>) -> String {
    if configured == START_TIME {
        started.format("%Y%m%d-%H%M%S-%3f").to_string()
    } else {
        configured.to_string()
    }
}

pub fn run_dir(base: &Path, name: &str) -> PathBuf {
    base.join(DATA_DIR).join(name)
}

pub fn run_log_path(dir: &Path, run_id: usize) -> PathBuf {
    dir.join(format!("run_{run_id}.jsonl"))
}

/// Create (if needed) and return the directory for a batch.
pub fn create_run_dir(base: &Path, name: &str) -> OutputResult<PathBuf> {
    let dir = run_dir(base, name);
    fs::create_dir_all(&dir)?;
    tracing::info!(dir = %dir.display(), "log directory ready");
    Ok(dir)
}

/// Names of the result directories under `base/simData`, sorted.
pub fn list_results(base: &Path) -> OutputResult<Vec<String>> {
    let root = base.join(DATA_DIR);
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
