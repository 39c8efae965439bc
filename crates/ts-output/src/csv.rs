//! CSV backend: a flat table for spreadsheet-style post-processing.
//!
//! Columns are `asn, mote_id, type, payload`; `payload` holds the event's
//! own fields as a JSON object.

use std::fs::File;
use std::path::Path;

use csv::Writer;
use serde_json::Value;

use ts_core::LogRecord;

use crate::OutputResult;
use crate::writer::LogWriter;

pub struct CsvWriter {
    out:      Writer<File>,
    finished: bool,
}

impl CsvWriter {
    /// Create `path` and write the header row.
    pub fn create(path: &Path) -> OutputResult<Self> {
        let mut out = Writer::from_path(path)?;
        out.write_record(["asn", "mote_id", "type", "payload"])?;
        Ok(CsvWriter { out, finished: false })
    }
}

impl LogWriter for CsvWriter {
    fn write_record(&mut self, record: &LogRecord) -> OutputResult<()> {
        let mut payload = serde_json::to_value(&record.event)?;
        if let Value::Object(map) = &mut payload {
            map.remove("_type");
        }
        let mote = record.mote_id.map(|m| m.0.to_string()).unwrap_or_default();
        self.out.write_record([
            record.asn.0.to_string(),
            mote,
            record.type_name().to_string(),
            payload.to_string(),
        ])?;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.out.flush()?;
        Ok(())
    }
}
