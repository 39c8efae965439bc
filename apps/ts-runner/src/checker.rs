//! Config checker: every key given must be consumed by the simulator, and
//! every key the simulator needs must be given.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use ts_core::Settings;

use crate::config::{ConfigFile, RUN_LENGTH_KEYS};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Present in the config but consumed by nothing.
    pub unknown: Vec<String>,
    /// Needed but absent from both `regular` and `combination`.
    pub missing: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.unknown.is_empty() && self.missing.is_empty()
    }
}

/// Keys whose default is unset.  They may be left out.
pub fn optional_keys() -> BTreeSet<String> {
    match serde_json::to_value(Settings::default()) {
        Ok(Value::Object(map)) => map.into_iter().filter(|(_, v)| v.is_null()).map(|(k, _)| k).collect(),
        _ => BTreeSet::new(),
    }
}

/// Check the keys of a full config file.
pub fn check_config(config: &ConfigFile) -> CheckReport {
    let given: BTreeSet<String> = config
        .settings
        .regular
        .keys()
        .chain(config.settings.combination.keys())
        .cloned()
        .collect();
    check_keys(&given)
}

/// Check a bare settings object.
pub fn check_settings(settings: &Map<String, Value>) -> CheckReport {
    check_keys(&settings.keys().cloned().collect())
}

fn check_keys(given: &BTreeSet<String>) -> CheckReport {
    let known: BTreeSet<String> = Settings::known_keys().into_iter().collect();
    let optional = optional_keys();
    let has_run_length = RUN_LENGTH_KEYS.iter().any(|k| given.contains(*k));

    let unknown = given.difference(&known).cloned().collect();
    let missing = known
        .difference(given)
        .filter(|k| !optional.contains(*k))
        .filter(|k| !(has_run_length && RUN_LENGTH_KEYS.contains(&k.as_str())))
        .cloned()
        .collect();
    CheckReport { unknown, missing }
}
