//! K7 connectivity traces.
//!
//! # File format
//!
//! A gzipped text file.  Line 0 is a JSON header:
//!
//! ```text
//! {"node_count": 50, "channels": [11, 12, ...], "start_date": "2020-01-01 00:00:00",
//!  "stop_date": "2020-01-01 01:00:00", ...}
//! ```
//!
//! The remaining lines are CSV with a column header row:
//!
//! ```text
//! timestamp,src,dst,channel,pdr,rssi
//! 2020-01-01 00:00:00,0,1,11,0.92,-81.5
//! ```
//!
//! Rows are replayed in timestamp order: a row takes effect once simulated
//! time reaches `timestamp - start_date`.  Files not ending in `.gz` are read
//! uncompressed.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use serde::Deserialize;
use ts_core::{MoteId, Settings, SimRng};

use crate::{
    ConnectivityError, ConnectivityMatrix, ConnectivityModel, ConnectivityResult, LINK_NONE_RSSI,
    Link,
};

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Deserialize)]
struct K7Header {
    node_count: u32,
    channels:   Vec<u8>,
    start_date: String,
    stop_date:  String,
}

#[derive(Debug, Deserialize)]
struct K7Row {
    timestamp: String,
    src:       u32,
    dst:       u32,
    channel:   u8,
    pdr:       f64,
    #[serde(default)]
    rssi:      Option<f64>,
}

#[derive(Clone, Debug)]
struct LinkUpdate {
    offset_s: f64,
    src:      MoteId,
    dst:      MoteId,
    channel:  u8,
    link:     Link,
}

fn parse_timestamp(s: &str) -> ConnectivityResult<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ConnectivityError::Config(format!("bad K7 timestamp {s:?}")))
}

/// Trace-driven connectivity.
pub struct K7Trace {
    pub node_count: u32,
    pub channels:   Vec<u8>,
    /// Trace duration in seconds (`stop_date - start_date`).
    pub duration_s: f64,
    updates:        Vec<LinkUpdate>,
    cursor:         usize,
}

impl K7Trace {
    /// Open and validate a trace against the run's settings.
    pub fn open(path: impl AsRef<Path>, settings: &Settings) -> ConnectivityResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let trace = Self::from_reader(BufReader::new(reader), settings.exec_num_motes)?;
        trace.check_against(settings)?;
        tracing::info!(
            path = %path.display(),
            rows = trace.updates.len(),
            duration_s = trace.duration_s,
            "K7 trace loaded"
        );
        Ok(trace)
    }

    /// Parse a trace from an already-decompressed reader.  Rows naming motes
    /// at or beyond `num_motes` are skipped.
    pub fn from_reader<R: BufRead>(mut reader: R, num_motes: u32) -> ConnectivityResult<Self> {
        let mut first = String::new();
        reader.read_line(&mut first)?;
        let header: K7Header = serde_json::from_str(first.trim())?;
        let start = parse_timestamp(&header.start_date)?;
        let stop = parse_timestamp(&header.stop_date)?;
        let duration_s = (stop - start).num_milliseconds() as f64 / 1000.0;

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut updates = Vec::new();
        for (i, row) in csv_reader.deserialize::<K7Row>().enumerate() {
            let row = row?;
            if row.src >= num_motes || row.dst >= num_motes {
                continue;
            }
            let at = parse_timestamp(&row.timestamp).map_err(|e| ConnectivityError::Trace {
                // +2: JSON header and CSV column header.
                line: i + 2,
                msg:  e.to_string(),
            })?;
            updates.push(LinkUpdate {
                offset_s: (at - start).num_milliseconds() as f64 / 1000.0,
                src:      MoteId(row.src),
                dst:      MoteId(row.dst),
                channel:  row.channel,
                link:     Link { pdr: row.pdr, rssi: row.rssi.unwrap_or(LINK_NONE_RSSI) },
            });
        }
        updates.sort_by(|a, b| a.offset_s.total_cmp(&b.offset_s));

        Ok(K7Trace {
            node_count: header.node_count,
            channels: header.channels,
            duration_s,
            updates,
            cursor: 0,
        })
    }

    /// Reject a run the trace cannot cover.
    pub fn check_against(&self, settings: &Settings) -> ConnectivityResult<()> {
        if settings.exec_num_motes > self.node_count {
            return Err(ConnectivityError::Config(format!(
                "trace has {} nodes, run needs {}",
                self.node_count, settings.exec_num_motes
            )));
        }
        let trace_slots = (self.duration_s / settings.tsch_slot_duration + 1e-6).floor() as u64;
        if settings.total_slots() > trace_slots {
            return Err(ConnectivityError::Config(format!(
                "run of {} slots is longer than the {} s trace ({} slots)",
                settings.total_slots(),
                self.duration_s,
                trace_slots
            )));
        }
        let missing: Vec<u8> = settings
            .tsch_hopping_sequence
            .iter()
            .copied()
            .filter(|c| !self.channels.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(ConnectivityError::Config(format!(
                "hopping sequence channels {missing:?} are not in the trace"
            )));
        }
        Ok(())
    }

    fn apply_until(&mut self, matrix: &mut ConnectivityMatrix, until_s: f64) {
        while let Some(u) = self.updates.get(self.cursor) {
            if u.offset_s > until_s {
                break;
            }
            matrix.set_link(u.src, u.dst, u.channel, u.link);
            self.cursor += 1;
        }
    }
}

impl ConnectivityModel for K7Trace {
    fn name(&self) -> &'static str {
        "K7"
    }

    fn init(&mut self, matrix: &mut ConnectivityMatrix, _rng: &mut SimRng) -> ConnectivityResult<()> {
        self.cursor = 0;
        // The first batch describes the network at time zero, even when the
        // trace's first row is stamped after start_date.
        let first = self.updates.first().map_or(0.0, |u| u.offset_s.max(0.0));
        self.apply_until(matrix, first);
        Ok(())
    }

    fn advance(&mut self, matrix: &mut ConnectivityMatrix, now_s: f64) -> Option<f64> {
        self.apply_until(matrix, now_s);
        self.next_update_s()
    }

    fn next_update_s(&self) -> Option<f64> {
        self.updates.get(self.cursor).map(|u| u.offset_s)
    }
}
