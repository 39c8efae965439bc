//! check-config — report config keys the simulator ignores or needs.

use std::process;

use anyhow::{Result, bail};
use clap::Parser;
use serde_json::{Map, Value};

use ts_core::Settings;
use ts_runner::config::read_source;
use ts_runner::{ConfigFile, check_config, check_settings, init_tracing};

/// Check a simulator config file.
#[derive(Parser, Debug)]
#[command(name = "check-config", version, about)]
struct Cli {
    /// List every key the simulator consumes and exit.
    #[arg(short = 'k', long)]
    keys: bool,

    /// The input is a bare settings object, not a full config file.
    #[arg(short = 's', long)]
    settings_only: bool,

    /// Config source, or `-` for stdin.
    #[arg(short = 'c', long, default_value = "config.json")]
    config: String,
}

fn run(cli: Cli) -> Result<()> {
    if cli.keys {
        for key in Settings::known_keys() {
            println!("{key}");
        }
        return Ok(());
    }

    let (report, config) = if cli.settings_only {
        let text = read_source(&cli.config)?;
        let map: Map<String, Value> = serde_json::from_str(&text)?;
        (check_settings(&map), None)
    } else {
        let config = ConfigFile::load(&cli.config)?;
        (check_config(&config), Some(config))
    };

    for key in &report.unknown {
        println!("unknown key: {key}");
    }
    for key in &report.missing {
        println!("missing key: {key}");
    }
    if !report.is_ok() {
        bail!("{} unknown and {} missing keys", report.unknown.len(), report.missing.len());
    }
    // Keys are fine; now the values.
    if let Some(config) = config {
        let runs = config.expand_runs()?;
        println!("ok: {} runs", runs.len());
    } else {
        println!("ok");
    }
    Ok(())
}

fn main() {
    init_tracing();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
