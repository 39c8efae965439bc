//! The `LogWriter` trait implemented by every log backend.

use ts_core::LogRecord;

use crate::OutputResult;

/// Persists log records.
///
/// Errors are returned to the caller; [`SimLogObserver`](crate::SimLogObserver)
/// stores the first one since observer hooks cannot fail.
pub trait LogWriter {
    fn write_record(&mut self, record: &LogRecord) -> OutputResult<()>;

    /// Push buffered records to the underlying file without closing it.
    fn flush(&mut self) -> OutputResult<()>;

    /// Flush and close.  Idempotent.
    fn finish(&mut self) -> OutputResult<()>;
}
