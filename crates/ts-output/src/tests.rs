//! Tests for ts-output.

#[cfg(test)]
mod helpers {
    use ts_core::{Asn, LogEvent, LogRecord, MoteId, PacketInfo};

    pub fn packet(uid: u64) -> PacketInfo {
        PacketInfo {
            uid,
            kind:    "DATA".into(),
            mac_src: None,
            mac_dst: None,
            net_src: None,
            net_dst: None,
            length:  90,
        }
    }

    pub fn records() -> Vec<LogRecord> {
        vec![
            LogRecord::new(Asn(3), Some(MoteId(1)), LogEvent::AppTx { packet: packet(1) }),
            LogRecord::new(Asn(9), Some(MoteId(2)), LogEvent::RadioStats { tx: 1, rx: 2, idle_listen: 3, sleep: 4 }),
            LogRecord::new(Asn(10), None, LogEvent::SimEnd { num_motes: 3 }),
        ]
    }
}

#[cfg(test)]
mod filter_tests {
    use crate::{LogFilter, OutputError};

    #[test]
    fn all_accepts_everything() {
        let f: LogFilter = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(f, LogFilter::All);
        assert!(f.accepts("tsch.txdone"));
        assert!(f.accepts("config"));
    }

    #[test]
    fn list_accepts_only_listed() {
        let f: LogFilter = serde_json::from_str(r#"["app.tx", "app.rx"]"#).unwrap();
        assert!(f.accepts("app.tx"));
        assert!(f.accepts("app.rx"));
        assert!(!f.accepts("radio.stats"));
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(matches!(LogFilter::types(["app.tx", "app.bogus"]), Err(OutputError::UnknownLogType(t)) if t == "app.bogus"));
        assert!(serde_json::from_str::<LogFilter>(r#"["nope"]"#).is_err());
        assert!(serde_json::from_str::<LogFilter>("\"some\"").is_err());
    }

    #[test]
    fn serializes_sorted() {
        let f = LogFilter::types(["sim.end", "app.tx"]).unwrap();
        assert_eq!(serde_json::to_string(&f).unwrap(), r#"["app.tx","sim.end"]"#);
        assert_eq!(serde_json::to_string(&LogFilter::All).unwrap(), "\"all\"");
    }
}

#[cfg(test)]
mod jsonl_tests {
    use std::fs;

    use tempfile::TempDir;

    use super::helpers::records;
    use crate::writer::LogWriter;
    use crate::{JsonlWriter, read_jsonl};

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    #[test]
    fn one_line_per_record() {
        let dir = tmp();
        let path = dir.path().join("run_0.jsonl");
        let mut w = JsonlWriter::create(&path).unwrap();
        for r in &records() {
            w.write_record(r).unwrap();
        }
        w.finish().unwrap();
        w.finish().unwrap();
        assert_eq!(w.written(), 3);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["_asn"], 3);
        assert_eq!(first["_mote_id"], 1);
        assert_eq!(first["_type"], "app.tx");
        assert_eq!(first["packet"]["type"], "DATA");
        let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert!(last.get("_mote_id").is_none());
    }

    #[test]
    fn read_back() {
        let dir = tmp();
        let path = dir.path().join("run_0.jsonl");
        let mut w = JsonlWriter::create(&path).unwrap();
        for r in &records() {
            w.write_record(r).unwrap();
        }
        w.finish().unwrap();
        assert_eq!(read_jsonl(&path).unwrap(), records());
    }

    #[test]
    fn bad_line_reports_position() {
        let dir = tmp();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"_asn\":1,\"_type\":\"sim.end\",\"num_motes\":2}\n\nnot json\n").unwrap();
        let err = read_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains(":3:"), "{err}");
    }
}

#[cfg(test)]
mod csv_tests {
    use super::helpers::records;
    use crate::CsvWriter;
    use crate::writer::LogWriter;

    #[test]
    fn header_and_rows() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("log.csv");
        let mut w = CsvWriter::create(&path).unwrap();
        for r in &records() {
            w.write_record(r).unwrap();
        }
        w.finish().unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<_> = rdr.headers().unwrap().iter().map(str::to_owned).collect();
        assert_eq!(headers, ["asn", "mote_id", "type", "payload"]);
        let rows: Vec<_> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][0], "9");
        assert_eq!(&rows[1][1], "2");
        assert_eq!(&rows[1][2], "radio.stats");
        let payload: serde_json::Value = serde_json::from_str(&rows[1][3]).unwrap();
        assert_eq!(payload["sleep"], 4);
        assert!(payload.get("_type").is_none());
        assert_eq!(&rows[2][1], ""); // no mote
    }
}

#[cfg(test)]
mod observer_tests {
    use ts_core::{ConnClass, LogSink, Settings};
    use ts_sim::SimBuilder;

    use super::helpers::records;
    use crate::{ChannelSink, JsonlWriter, LogFilter, SimLogObserver, read_jsonl};

    #[test]
    fn filter_applies_before_writing() {
        let mut obs = SimLogObserver::new(JsonlWriter::new(Vec::new()), LogFilter::types(["radio.stats"]).unwrap());
        for r in records() {
            obs.log(r);
        }
        assert_eq!(obs.written(), 1);
        assert!(obs.take_error().is_none());
        let bytes = obs.into_writer().into_inner();
        assert_eq!(String::from_utf8(bytes).unwrap().lines().count(), 1);
    }

    #[test]
    fn whole_run_to_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("run_0.jsonl");
        let settings = Settings {
            exec_num_motes: 3,
            exec_num_slotframes_per_run: Some(20),
            conn_class: ConnClass::FullyMeshed,
            ..Settings::default()
        };
        let mut sim = SimBuilder::new(settings).build().unwrap();
        let mut obs = SimLogObserver::new(JsonlWriter::create(&path).unwrap(), LogFilter::All);
        sim.run(&mut obs).unwrap();
        assert!(obs.take_error().is_none());
        drop(obs);

        let back = read_jsonl(&path).unwrap();
        assert_eq!(back.first().map(|r| r.type_name()), Some("config"));
        assert_eq!(back.last().map(|r| r.type_name()), Some("sim.end"));
    }

    #[test]
    fn channel_sink_streams_matching_records() {
        let (mut sink, rx) = ChannelSink::pair(LogFilter::types(["app.tx", "sim.end"]).unwrap());
        for r in records() {
            sink.log(r);
        }
        let got: Vec<_> = rx.try_iter().map(|r| r.type_name()).collect();
        assert_eq!(got, ["app.tx", "sim.end"]);
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (mut sink, rx) = ChannelSink::pair(LogFilter::All);
        drop(rx);
        for r in records() {
            sink.log(r);
        }
    }
}

#[cfg(test)]
mod rundir_tests {
    use chrono::{Local, TimeZone};

    use crate::{create_run_dir, list_results, log_directory_name, run_log_path};

    #[test]
    fn start_time_keyword_is_formatted() {
        let t = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(log_directory_name("startTime", t), "20240305-140709-000");
        assert_eq!(log_directory_name("exp_a", t), "exp_a");
    }

    #[test]
    fn dirs_and_listing() {
        let base = tempfile::tempdir().expect("create temp dir");
        assert!(list_results(base.path()).unwrap().is_empty());
        let b = create_run_dir(base.path(), "b").unwrap();
        create_run_dir(base.path(), "a").unwrap();
        assert!(b.ends_with("simData/b"));
        assert_eq!(run_log_path(&b, 4).file_name().unwrap(), "run_4.jsonl");
        assert_eq!(list_results(base.path()).unwrap(), ["a", "b"]);
    }
}
