//! tsch-sim — run every simulation a config file describes.
//!
//! ```text
//! tsch-sim --config config.json --num-runs 4 --set exec_numMotes=20
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;

use ts_runner::{ConfigFile, init_tracing, run_batch};

/// Run a batch of 6TiSCH simulations.
#[derive(Parser, Debug)]
#[command(name = "tsch-sim", version, about)]
struct Cli {
    /// Config file, or `-` for stdin.  Defaults to the built-in config.
    #[arg(short, long)]
    config: Option<String>,

    /// Directory `simData/` is created in.
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Override `execution.numRuns`.
    #[arg(long)]
    num_runs: Option<usize>,

    /// Override `execution.numCPUs`.
    #[arg(long)]
    num_cpus: Option<i32>,

    /// Override a numeric setting, e.g. `--set exec_numMotes=20`.
    #[arg(long = "set", value_name = "KEY=NUMBER", value_parser = parse_override)]
    overrides: Vec<(String, f64)>,
}

fn parse_override(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected KEY=NUMBER, got {s:?}"))?;
    let value: f64 = value.trim().parse().map_err(|_| format!("{value:?} is not a number"))?;
    Ok((key.trim().to_string(), value))
}

fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 9.0e15 {
        Value::from(v as i64)
    } else {
        Value::from(v)
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ConfigFile::load(path).with_context(|| format!("loading {path}"))?,
        None => ConfigFile::default(),
    };
    if let Some(n) = cli.num_runs {
        config.execution.num_runs = n;
    }
    if let Some(n) = cli.num_cpus {
        config.execution.num_cpus = n;
    }
    for (key, value) in &cli.overrides {
        config.set_regular(key, number(*value));
    }

    let report = run_batch(&config, &cli.base_dir)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.num_failed() > 0 {
        bail!("{} of {} runs failed", report.num_failed(), report.runs.len());
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
