//! `SimLogObserver<W>` bridges a run's log to a `LogWriter`.

use ts_core::{Asn, LogRecord, LogSink};
use ts_sim::SimObserver;

use crate::writer::LogWriter;
use crate::{LogFilter, OutputError};

/// A [`SimObserver`] that persists every record the filter accepts.
///
/// Write errors are stored because `LogSink::log` has no return value.
/// After `sim.run()` returns, check with [`take_error`](Self::take_error).
pub struct SimLogObserver<W: LogWriter> {
    writer:     W,
    filter:     LogFilter,
    written:    u64,
    last_error: Option<OutputError>,
}

impl<W: LogWriter> SimLogObserver<W> {
    pub fn new(writer: W, filter: LogFilter) -> Self {
        SimLogObserver { writer, filter, written: 0, last_error: None }
    }

    /// Take the stored write error (if any).
    pub fn take_error(&mut self) -> Option<OutputError> {
        self.last_error.take()
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn store_err(&mut self, result: crate::OutputResult<()>) {
        if let Err(e) = result {
            if self.last_error.is_none() {
                tracing::error!(error = %e, "log write failed");
                self.last_error = Some(e);
            }
        }
    }
}

impl<W: LogWriter> LogSink for SimLogObserver<W> {
    fn log(&mut self, record: LogRecord) {
        if !self.filter.accepts(record.type_name()) {
            return;
        }
        let result = self.writer.write_record(&record);
        if result.is_ok() {
            self.written += 1;
        }
        self.store_err(result);
    }
}

impl<W: LogWriter> SimObserver for SimLogObserver<W> {
    fn on_pause(&mut self, _asn: Asn) {
        // Readers may look at the file while paused.
        let result = self.writer.flush();
        self.store_err(result);
    }

    fn on_sim_end(&mut self, _final_asn: Asn) {
        let result = self.writer.finish();
        self.store_err(result);
    }
}
