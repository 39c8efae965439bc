//! `ts-output` — persistence of the simulation event log.
//!
//! A run's log is a stream of [`LogRecord`](ts_core::LogRecord)s.  This
//! crate decides which of them are kept ([`LogFilter`]) and where they go:
//!
//! * [`JsonlWriter`]: one JSON object per line, the native format.
//! * [`CsvWriter`]: a flat `asn, mote_id, type, payload` table.
//! * [`ChannelSink`]: a crossbeam channel, for live consumers.
//!
//! [`SimLogObserver`] adapts any [`LogWriter`] to a
//! [`SimObserver`](ts_sim::SimObserver).
//!
//! # Usage
//!
//! ```rust,ignore
//! let writer = JsonlWriter::create(&run_log_path(&dir, 0))?;
//! let mut obs = SimLogObserver::new(writer, LogFilter::All);
//! sim.run(&mut obs)?;
//! if let Some(e) = obs.take_error() { return Err(e.into()); }
//! ```

pub mod channel;
pub mod csv;
pub mod error;
pub mod filter;
pub mod jsonl;
pub mod observer;
pub mod rundir;
pub mod writer;

#[cfg(test)]
mod tests;

pub use crate::csv::CsvWriter;
pub use channel::ChannelSink;
pub use error::{OutputError, OutputResult};
pub use filter::LogFilter;
pub use jsonl::{JsonlWriter, read_jsonl};
pub use observer::SimLogObserver;
pub use rundir::{create_run_dir, list_results, log_directory_name, run_dir, run_log_path};
pub use writer::LogWriter;
