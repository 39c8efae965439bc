//! The JSON config file and its expansion into individual runs.
//!
//! ```json
//! {
//!   "version": 0,
//!   "execution": { "numCPUs": 1, "numRuns": 2 },
//!   "settings": {
//!     "regular":     { "exec_numMotes": 10, "exec_randomSeed": "random" },
//!     "combination": { "sf_class": ["MSF", "SFNone"] }
//!   },
//!   "logging": "all",
//!   "log_directory_name": "startTime",
//!   "post": []
//! }
//! ```
//!
//! `combination` lists are expanded into their cartesian product (keys in
//! sorted order), and every combination is run `numRuns` times.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ts_core::Settings;
use ts_output::LogFilter;
use ts_output::rundir::START_TIME;

use crate::{RunnerError, RunnerResult};

pub const CONFIG_VERSION: u32 = 0;

/// Seed keyword asking for a fresh random seed per run.
pub const RANDOM_SEED: &str = "random";
pub const SEED_KEY: &str = "exec_randomSeed";

/// Mutually exclusive ways of giving the run length.
pub const RUN_LENGTH_KEYS: [&str; 2] = ["exec_numSlotframesPerRun", "exec_minutesPerRun"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub version:            u32,
    #[serde(default)]
    pub execution:          Execution,
    #[serde(default)]
    pub settings:           SettingsSection,
    #[serde(default)]
    pub logging:            LogFilter,
    #[serde(default = "default_log_directory_name")]
    pub log_directory_name: String,
    /// Shell commands run in the log directory once every run is done.
    #[serde(default)]
    pub post:               Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Execution {
    /// Worker threads; `-1` (or any value below 1) uses every core.
    #[serde(rename = "numCPUs")]
    pub num_cpus: i32,
    #[serde(rename = "numRuns")]
    pub num_runs: usize,
}

impl Default for Execution {
    fn default() -> Self {
        Execution { num_cpus: 1, num_runs: 1 }
    }
}

impl Execution {
    pub fn worker_threads(&self) -> usize {
        match usize::try_from(self.num_cpus) {
            Ok(n) if n > 0 => n,
            _ => std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsSection {
    #[serde(default)]
    pub regular:     Map<String, Value>,
    #[serde(default)]
    pub combination: BTreeMap<String, Vec<Value>>,
}

fn default_log_directory_name() -> String {
    START_TIME.to_string()
}

/// One expanded run.
#[derive(Clone, Debug)]
pub struct RunSpec {
    pub run_id:      usize,
    /// The combination values this run uses, by key.
    pub combination: BTreeMap<String, Value>,
    pub settings:    Settings,
}

impl Default for ConfigFile {
    /// One run of the default settings, everything logged.
    fn default() -> Self {
        let regular = match serde_json::to_value(Settings::default()) {
            Ok(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            _ => Map::new(),
        };
        ConfigFile {
            version:            CONFIG_VERSION,
            execution:          Execution::default(),
            settings:           SettingsSection { regular, combination: BTreeMap::new() },
            logging:            LogFilter::All,
            log_directory_name: default_log_directory_name(),
            post:               Vec::new(),
        }
    }
}

impl ConfigFile {
    pub fn parse(text: &str) -> RunnerResult<Self> {
        let config: ConfigFile = serde_json::from_str(text)?;
        if config.version != CONFIG_VERSION {
            return Err(RunnerError::Version { expected: CONFIG_VERSION, found: config.version });
        }
        Ok(config)
    }

    /// Read from `path`, or from stdin when `path` is `-`.
    pub fn load(path: &str) -> RunnerResult<Self> {
        Self::parse(&read_source(path)?)
    }

    pub fn save(&self, path: &Path) -> RunnerResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Overwrite a regular setting (command-line overrides).  Setting one
    /// run-length key clears the other.
    pub fn set_regular(&mut self, key: &str, value: Value) {
        if let Some(other) = RUN_LENGTH_KEYS.iter().find(|k| **k != key && RUN_LENGTH_KEYS.contains(&key)) {
            self.settings.regular.remove(*other);
            self.settings.combination.remove(*other);
        }
        self.settings.combination.remove(key);
        self.settings.regular.insert(key.to_string(), value);
    }

    /// Every combination, in the order runs are numbered.
    pub fn combinations(&self) -> Vec<BTreeMap<String, Value>> {
        let mut combos = vec![BTreeMap::new()];
        for (key, values) in &self.settings.combination {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for v in values {
                    let mut c = combo.clone();
                    c.insert(key.clone(), v.clone());
                    next.push(c);
                }
            }
            combos = next;
        }
        combos
    }

    /// Expand into `combinations × numRuns` runs, numbered from 0.
    ///
    /// Run `k` uses seed `exec_randomSeed + k`, or a fresh random seed when
    /// the configured seed is `"random"`.
    pub fn expand_runs(&self) -> RunnerResult<Vec<RunSpec>> {
        for (key, values) in &self.settings.combination {
            if values.is_empty() {
                return Err(RunnerError::Config(format!("combination key {key} has no values")));
            }
        }
        let mut runs = Vec::new();
        for combo in self.combinations() {
            for _ in 0..self.execution.num_runs {
                let run_id = runs.len();
                let mut map = self.settings.regular.clone();
                for (k, v) in &combo {
                    map.insert(k.clone(), v.clone());
                }
                let seed = resolve_seed(map.get(SEED_KEY), run_id)?;
                map.insert(SEED_KEY.to_string(), Value::from(seed));
                let settings = Settings::from_json(Value::Object(map))?;
                runs.push(RunSpec { run_id, combination: combo.clone(), settings });
            }
        }
        Ok(runs)
    }
}

fn resolve_seed(value: Option<&Value>, run_id: usize) -> RunnerResult<u64> {
    match value {
        None => Ok(run_id as u64),
        Some(Value::String(s)) if s == RANDOM_SEED => Ok(u64::from(rand::random::<u32>())),
        Some(v) => v
            .as_u64()
            .map(|base| base.wrapping_add(run_id as u64))
            .ok_or_else(|| RunnerError::Config(format!("{SEED_KEY} must be an integer or \"random\", got {v}"))),
    }
}

/// Contents of `path`, or of stdin when `path` is `-`.
pub fn read_source(path: &str) -> RunnerResult<String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}
