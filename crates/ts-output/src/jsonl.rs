//! JSON-lines backend: one record per line, the run's native format.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ts_core::LogRecord;

use crate::writer::LogWriter;
use crate::{OutputError, OutputResult};

pub struct JsonlWriter<W: Write> {
    out:      W,
    finished: bool,
    written:  u64,
}

impl JsonlWriter<BufWriter<File>> {
    /// Create (or truncate) `path`.
    pub fn create(path: &Path) -> OutputResult<Self> {
        let file = File::create(path)?;
        tracing::debug!(path = %path.display(), "log file created");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W) -> Self {
        JsonlWriter { out, finished: false, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LogWriter for JsonlWriter<W> {
    fn write_record(&mut self, record: &LogRecord) -> OutputResult<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
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

/// Read back every record of a JSONL log.  Blank lines are skipped.
pub fn read_jsonl(path: &Path) -> OutputResult<Vec<LogRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| OutputError::BadRecord {
            path: path.display().to_string(),
            line: i + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}
