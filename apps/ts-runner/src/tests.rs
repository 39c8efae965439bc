//! Tests for ts-runner.

#[cfg(test)]
mod helpers {
    use serde_json::json;

    use crate::ConfigFile;

    /// A fast two-mote config with the given combination block.
    pub fn small_config(combination: serde_json::Value, num_runs: usize) -> ConfigFile {
        ConfigFile::parse(
            &json!({
                "version": 0,
                "execution": { "numCPUs": 2, "numRuns": num_runs },
                "settings": {
                    "regular": {
                        "exec_numMotes": 2,
                        "exec_numSlotframesPerRun": 10,
                        "exec_randomSeed": 5,
                        "conn_class": "FullyMeshed"
                    },
                    "combination": combination
                },
                "logging": ["config", "sim.end"],
                "log_directory_name": "unit"
            })
            .to_string(),
        )
        .expect("valid config")
    }
}

#[cfg(test)]
mod config_tests {
    use serde_json::json;

    use super::helpers::small_config;
    use crate::{ConfigFile, RunnerError};

    #[test]
    fn default_config_expands_to_one_run() {
        let runs = ConfigFile::default().expand_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].settings, ts_core::Settings::default());
    }

    #[test]
    fn wrong_version_rejected() {
        let err = ConfigFile::parse(r#"{"version": 7}"#).unwrap_err();
        assert!(matches!(err, RunnerError::Version { expected: 0, found: 7 }));
    }

    #[test]
    fn cartesian_product_in_sorted_key_order() {
        let config = small_config(json!({ "tsch_slotframeLength": [11, 13], "exec_numMotes": [2, 3, 4] }), 2);
        let runs = config.expand_runs().unwrap();
        assert_eq!(runs.len(), 3 * 2 * 2);

        // exec_numMotes sorts first, so it varies slowest.
        let shape: Vec<(u32, u32)> = runs
            .iter()
            .map(|r| (r.settings.exec_num_motes, r.settings.tsch_slotframe_length))
            .collect();
        assert_eq!(&shape[..4], &[(2, 11), (2, 11), (2, 13), (2, 13)]);
        assert_eq!(shape[11], (4, 13));
        assert_eq!(runs[5].combination["exec_numMotes"], json!(3));
    }

    #[test]
    fn seeds_step_with_run_id() {
        let runs = small_config(json!({}), 3).expand_runs().unwrap();
        let seeds: Vec<u64> = runs.iter().map(|r| r.settings.exec_random_seed).collect();
        assert_eq!(seeds, vec![5, 6, 7]);
        assert_eq!(runs.iter().map(|r| r.run_id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn random_seed_keyword_accepted() {
        let mut config = small_config(json!({}), 2);
        config.set_regular("exec_randomSeed", json!("random"));
        assert_eq!(config.expand_runs().unwrap().len(), 2);

        config.set_regular("exec_randomSeed", json!("later"));
        assert!(matches!(config.expand_runs(), Err(RunnerError::Config(_))));
    }

    #[test]
    fn run_length_override_clears_the_other_key() {
        let mut config = small_config(json!({}), 1);
        config.set_regular("exec_minutesPerRun", json!(0.5));
        assert!(!config.settings.regular.contains_key("exec_numSlotframesPerRun"));
        let runs = config.expand_runs().unwrap();
        assert_eq!(runs[0].settings.exec_minutes_per_run, Some(0.5));
    }

    #[test]
    fn unknown_setting_fails_expansion() {
        let config = small_config(json!({ "tsch_bogus": [1] }), 1);
        assert!(matches!(config.expand_runs(), Err(RunnerError::Settings(_))));
    }

    #[test]
    fn empty_combination_list_rejected() {
        let config = small_config(json!({ "exec_numMotes": [] }), 1);
        assert!(matches!(config.expand_runs(), Err(RunnerError::Config(_))));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("c.json");
        let config = small_config(json!({ "exec_numMotes": [2, 3] }), 1);
        config.save(&path).unwrap();
        assert_eq!(ConfigFile::load(&path.to_string_lossy()).unwrap(), config);
    }
}

#[cfg(test)]
mod checker_tests {
    use serde_json::{Map, Value, json};

    use super::helpers::small_config;
    use crate::checker::optional_keys;
    use crate::{ConfigFile, check_config, check_settings};

    #[test]
    fn default_config_is_complete() {
        let report = check_config(&ConfigFile::default());
        assert!(report.is_ok(), "{report:?}");
    }

    #[test]
    fn unknown_keys_reported() {
        let mut config = ConfigFile::default();
        config.settings.regular.insert("app_bogus".into(), json!(1));
        config.settings.combination.insert("rpl_nothing".into(), vec![json!(1)]);
        let report = check_config(&config);
        assert_eq!(report.unknown, ["app_bogus", "rpl_nothing"]);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn missing_keys_reported() {
        let report = check_config(&small_config(json!({}), 1));
        assert!(report.unknown.is_empty());
        assert!(report.missing.contains(&"tsch_slotframeLength".to_string()));
        assert!(!report.missing.contains(&"exec_numMotes".to_string()));
        assert!(!report.missing.contains(&"exec_minutesPerRun".to_string()));
        assert!(!report.missing.iter().any(|k| optional_keys().contains(k)));
    }

    #[test]
    fn either_run_length_key_suffices() {
        let mut map: Map<String, Value> = match serde_json::to_value(ts_core::Settings::default()) {
            Ok(Value::Object(m)) => m.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            _ => unreachable!(),
        };
        map.remove("exec_numSlotframesPerRun");
        assert!(check_settings(&map).missing.contains(&"exec_numSlotframesPerRun".to_string()));
        map.insert("exec_minutesPerRun".into(), json!(2.0));
        assert!(check_settings(&map).is_ok());
    }
}

#[cfg(test)]
mod batch_tests {
    use serde_json::json;

    use ts_output::read_jsonl;

    use super::helpers::small_config;
    use crate::{RunState, run_batch};

    #[test]
    fn one_log_file_per_run() {
        let base = tempfile::tempdir().expect("create temp dir");
        let config = small_config(json!({ "exec_numMotes": [2, 3] }), 2);
        let report = run_batch(&config, base.path()).unwrap();

        assert_eq!(report.runs.len(), 4);
        assert_eq!(report.num_failed(), 0);
        assert!(report.log_dir.ends_with("simData/unit"));
        for status in &report.runs {
            assert_eq!(status.state, RunState::Finished);
            assert_eq!(status.last_asn, 10 * 101);
            let path = status.log_file.as_ref().unwrap();
            assert_eq!(path.file_name().unwrap().to_string_lossy(), format!("run_{}.jsonl", status.run_id));
            let records = read_jsonl(path).unwrap();
            let types: Vec<_> = records.iter().map(|r| r.type_name()).collect();
            assert_eq!(types, ["config", "sim.end"]);
        }
    }

    #[test]
    fn post_commands_run_in_log_dir() {
        let base = tempfile::tempdir().expect("create temp dir");
        let mut config = small_config(json!({}), 1);
        config.post = vec!["ls > listing.txt".into()];
        let report = run_batch(&config, base.path()).unwrap();
        let listing = std::fs::read_to_string(report.log_dir.join("listing.txt")).unwrap();
        assert!(listing.contains("run_0.jsonl"));
    }

    #[test]
    fn failing_post_command_is_an_error() {
        let base = tempfile::tempdir().expect("create temp dir");
        let mut config = small_config(json!({}), 1);
        config.post = vec!["exit 3".into()];
        assert!(matches!(run_batch(&config, base.path()), Err(crate::RunnerError::Post { .. })));
    }

    #[test]
    fn bad_trace_fails_the_run_not_the_batch() {
        let base = tempfile::tempdir().expect("create temp dir");
        let mut config = small_config(json!({}), 1);
        config.set_regular("conn_class", json!("K7"));
        config.set_regular("conn_trace", json!("/nonexistent/trace.k7.gz"));
        let report = run_batch(&config, base.path()).unwrap();
        assert_eq!(report.num_failed(), 1);
        assert!(report.runs[0].error.is_some());
    }
}

#[cfg(test)]
mod controller_tests {
    use std::sync::Arc;
    use std::thread;

    use crossbeam::channel::unbounded;
    use serde_json::json;

    use ts_core::{ConnClass, Settings};
    use ts_output::LogFilter;

    use super::helpers::small_config;
    use crate::{Controller, RunState, RunnerError, run_batch};

    fn settings(slotframes: u64) -> Settings {
        Settings {
            exec_num_motes: 2,
            exec_num_slotframes_per_run: Some(slotframes),
            conn_class: ConnClass::FullyMeshed,
            ..Settings::default()
        }
    }

    #[test]
    fn default_config_round_trip() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let ctl = Controller::new(dir.path());
        assert_eq!(ctl.get_default_config().unwrap(), crate::ConfigFile::default());
        let config = small_config(json!({ "exec_numMotes": [2, 5] }), 3);
        ctl.put_default_config(&config).unwrap();
        assert_eq!(ctl.get_default_config().unwrap(), config);
    }

    #[test]
    fn start_streams_matching_records() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let ctl = Controller::new(dir.path());
        let (tx, rx) = unbounded();
        let status = ctl.start(settings(5), LogFilter::types(["config", "sim.end"]).unwrap(), tx).unwrap();
        assert_eq!(status.state, RunState::Finished);
        assert_eq!(status.last_asn, 505);
        let types: Vec<_> = rx.try_iter().map(|r| r.type_name()).collect();
        assert_eq!(types, ["config", "sim.end"]);
        assert!(!ctl.is_running());
    }

    #[test]
    fn controls_need_an_active_run() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let ctl = Controller::new(dir.path());
        assert!(matches!(ctl.pause(), Err(RunnerError::NoActiveRun)));
        assert!(matches!(ctl.abort(), Err(RunnerError::NoActiveRun)));
    }

    #[test]
    fn abort_from_another_thread() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let ctl = Arc::new(Controller::new(dir.path()));
        let (tx, rx) = unbounded();

        let runner = {
            let ctl = Arc::clone(&ctl);
            // Long enough that the abort lands first.
            thread::spawn(move || ctl.start(settings(10_000_000), LogFilter::All, tx))
        };
        // The first record proves the run is live.
        rx.recv().unwrap();
        ctl.pause().unwrap();
        ctl.resume().unwrap();
        ctl.abort().unwrap();

        let status = runner.join().unwrap().unwrap();
        assert_eq!(status.state, RunState::Aborted);
        assert!(status.last_asn < 10_000_000 * 101);
        assert_eq!(rx.try_iter().filter(|r| r.type_name() == "sim.end").count(), 0);
    }

    #[test]
    fn results_listed_and_deleted() {
        let dir = tempfile::tempdir().expect("create temp dir");
        run_batch(&small_config(json!({}), 1), dir.path()).unwrap();
        let ctl = Controller::new(dir.path());
        assert_eq!(ctl.get_results().unwrap(), ["unit"]);
        assert!(matches!(ctl.delete_result("../unit"), Err(RunnerError::UnknownResult(_))));
        ctl.delete_result("unit").unwrap();
        assert!(ctl.get_results().unwrap().is_empty());
    }
}
