//! Streams a run's log to another thread.

use crossbeam::channel::{Receiver, Sender, unbounded};

use ts_core::{LogRecord, LogSink};
use ts_sim::SimObserver;

use crate::LogFilter;

/// Pushes every accepted record on a channel.  A dropped receiver silences
/// the sink but does not stop the run.
pub struct ChannelSink {
    tx:           Sender<LogRecord>,
    filter:       LogFilter,
    disconnected: bool,
}

impl ChannelSink {
    pub fn new(tx: Sender<LogRecord>, filter: LogFilter) -> Self {
        ChannelSink { tx, filter, disconnected: false }
    }

    /// A sink and the receiving end of a fresh unbounded channel.
    pub fn pair(filter: LogFilter) -> (Self, Receiver<LogRecord>) {
        let (tx, rx) = unbounded();
        (Self::new(tx, filter), rx)
    }
}

impl LogSink for ChannelSink {
    fn log(&mut self, record: LogRecord) {
        if self.disconnected || !self.filter.accepts(record.type_name()) {
            return;
        }
        if self.tx.send(record).is_err() {
            tracing::debug!("log receiver dropped");
            self.disconnected = true;
        }
    }
}

impl SimObserver for ChannelSink {}
