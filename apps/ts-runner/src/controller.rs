//! Front-end controller: the calls a GUI makes, backed by a directory.
//!
//! `start` blocks for the length of the run, so a front-end calls it from
//! its own thread and drives `pause` / `resume` / `abort` from another.
//! Every accepted log record is pushed on the channel given to `start`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Sender;

use ts_core::{LogRecord, Settings};
use ts_output::{ChannelSink, LogFilter, list_results, rundir::DATA_DIR};
use ts_sim::{ControlHandle, RunOutcome, SimBuilder};

use crate::batch::{RunState, RunStatus};
use crate::config::ConfigFile;
use crate::{RunnerError, RunnerResult};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// How often a paused run checks whether it may go on.
const PAUSE_POLL: Duration = Duration::from_millis(20);

pub struct Controller {
    base:   PathBuf,
    active: Mutex<Option<ControlHandle>>,
}

impl Controller {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Controller { base: base.into(), active: Mutex::new(None) }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The stored default config, or the built-in one if none was saved.
    pub fn get_default_config(&self) -> RunnerResult<ConfigFile> {
        let path = self.base.join(DEFAULT_CONFIG_FILE);
        if path.exists() {
            ConfigFile::load(&path.to_string_lossy())
        } else {
            Ok(ConfigFile::default())
        }
    }

    pub fn put_default_config(&self, config: &ConfigFile) -> RunnerResult<()> {
        // Reject what a batch could not run.
        config.expand_runs()?;
        std::fs::create_dir_all(&self.base)?;
        config.save(&self.base.join(DEFAULT_CONFIG_FILE))
    }

    /// Run `settings` to the end (or until aborted), streaming the records
    /// `filter` accepts on `events`.  One run at a time.
    pub fn start(&self, settings: Settings, filter: LogFilter, events: Sender<LogRecord>) -> RunnerResult<RunStatus> {
        let mut sim = SimBuilder::new(settings).build()?;
        let control = sim.control();
        {
            let mut active = self.lock_active();
            if active.is_some() {
                return Err(RunnerError::AlreadyRunning);
            }
            *active = Some(control.clone());
        }
        tracing::info!(end = %sim.end_asn(), "front-end run started");

        let mut sink = ChannelSink::new(events, filter);
        let result = loop {
            match sim.run(&mut sink) {
                Ok(RunOutcome::Paused(asn)) => {
                    tracing::debug!(%asn, "run paused");
                    while control.is_paused() && !control.is_aborted() {
                        thread::sleep(PAUSE_POLL);
                    }
                    sim.play();
                }
                other => break other,
            }
        };
        self.lock_active().take();

        let last_asn = sim.current_asn().0;
        let status = match result {
            Ok(RunOutcome::Finished) => {
                RunStatus { run_id: 0, state: RunState::Finished, last_asn, error: None, log_file: None }
            }
            Ok(_) => RunStatus { run_id: 0, state: RunState::Aborted, last_asn, error: None, log_file: None },
            Err(e) => {
                tracing::error!(error = %e, "front-end run failed");
                RunStatus { run_id: 0, state: RunState::Failed, last_asn, error: Some(e.to_string()), log_file: None }
            }
        };
        Ok(status)
    }

    pub fn pause(&self) -> RunnerResult<()> {
        self.with_active(ControlHandle::pause)
    }

    pub fn resume(&self) -> RunnerResult<()> {
        self.with_active(ControlHandle::resume)
    }

    pub fn abort(&self) -> RunnerResult<()> {
        self.with_active(ControlHandle::abort)
    }

    pub fn is_running(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Names of the stored batch results.
    pub fn get_results(&self) -> RunnerResult<Vec<String>> {
        Ok(list_results(&self.base)?)
    }

    pub fn delete_result(&self, name: &str) -> RunnerResult<()> {
        let known = self.get_results()?;
        if !known.iter().any(|n| n == name) {
            return Err(RunnerError::UnknownResult(name.to_string()));
        }
        std::fs::remove_dir_all(self.base.join(DATA_DIR).join(name))?;
        tracing::info!(name, "result deleted");
        Ok(())
    }

    fn with_active(&self, f: impl FnOnce(&ControlHandle)) -> RunnerResult<()> {
        match self.lock_active().as_ref() {
            Some(handle) => {
                f(handle);
                Ok(())
            }
            None => Err(RunnerError::NoActiveRun),
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ControlHandle>> {
        // A poisoned lock still holds a valid handle.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}
