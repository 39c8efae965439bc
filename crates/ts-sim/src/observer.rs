//! Observer hooks for a run.

use ts_core::{Asn, LogSink, MemoryLog, NullLog, Settings};

/// Receives every log record of a run, plus a few lifecycle callbacks.
///
/// The hook methods default to no-ops so a plain log sink only has to
/// implement [`LogSink`].
pub trait SimObserver: LogSink {
    /// Called once, after the `config` record and the boot of every mote.
    fn on_sim_start(&mut self, _settings: &Settings) {}

    /// Called when [`Sim::run`](crate::Sim::run) returns because of a pause.
    fn on_pause(&mut self, _asn: Asn) {}

    /// Called once after the terminal ASN, after the final records.
    fn on_sim_end(&mut self, _final_asn: Asn) {}
}

impl SimObserver for MemoryLog {}

impl SimObserver for NullLog {}
