//! `ts-runner` — everything around a run: the config file, the key
//! checker, the batch runner and the front-end controller.
//!
//! | Module         | Contents                                              |
//! |----------------|-------------------------------------------------------|
//! | [`config`]     | `ConfigFile`, combination expansion into `RunSpec`s   |
//! | [`checker`]    | unknown / missing key report                          |
//! | [`batch`]      | rayon batch execution, run status, post commands      |
//! | [`controller`] | `Controller` for a GUI front-end                      |

pub mod batch;
pub mod checker;
pub mod config;
pub mod controller;
pub mod error;

#[cfg(test)]
mod tests;

pub use batch::{BatchReport, RunState, RunStatus, run_batch};
pub use checker::{CheckReport, check_config, check_settings};
pub use config::{ConfigFile, RunSpec};
pub use controller::Controller;
pub use error::{RunnerError, RunnerResult};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the diagnostics subscriber on stderr.  `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();
}
