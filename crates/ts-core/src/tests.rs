//! Unit tests for ts-core primitives.

#[cfg(test)]
mod ids {
    use crate::MoteId;

    #[test]
    fn index_roundtrip() {
        let id = MoteId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(MoteId::try_from(42usize).unwrap(), id);
    }

    #[test]
    fn root_and_sentinel() {
        assert!(MoteId(0).is_root());
        assert!(!MoteId(1).is_root());
        assert_eq!(MoteId::INVALID.0, u32::MAX);
    }

    #[test]
    fn display() {
        assert_eq!(MoteId(7).to_string(), "MoteId(7)");
    }
}

#[cfg(test)]
mod time {
    use crate::{Asn, SlotClock};

    #[test]
    fn asn_arithmetic() {
        let a = Asn(10);
        assert_eq!(a + 5, Asn(15));
        assert_eq!(a.offset(3), Asn(13));
        assert_eq!(Asn(15) - Asn(10), 5u64);
        assert_eq!(Asn(3).since(Asn(10)), 0);
    }

    #[test]
    fn slot_offset_wraps() {
        assert_eq!(Asn(0).slot_offset(101), 0);
        assert_eq!(Asn(101).slot_offset(101), 0);
        assert_eq!(Asn(205).slot_offset(101), 3);
    }

    #[test]
    fn seconds_round_up_to_slots() {
        let clock = SlotClock::new(0.010);
        assert_eq!(clock.slots_for(60.0), 6000);
        assert_eq!(clock.slots_for(0.3), 30);
        assert_eq!(clock.slots_for(0.0151), 2);
        assert_eq!(clock.slots_for(0.0001), 1);
        assert_eq!(clock.slots_for(0.0), 0);
        assert_eq!(clock.slots_for_ms(8), 1);
        assert!((clock.seconds_at(Asn(250)) - 2.5).abs() < 1e-9);
    }
}

#[cfg(test)]
mod rng {
    use crate::SimRng;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SimRng::new(7);
        let mut b = SimRng::new(7);
        for _ in 0..32 {
            assert_eq!(a.random::<u64>(), b.random::<u64>());
        }
    }

    #[test]
    fn unit_in_range() {
        let mut r = SimRng::new(1);
        for _ in 0..1000 {
            let u = r.unit();
            assert!((0.0..1.0).contains(&u));
        }
    }
}

#[cfg(test)]
mod addr {
    use std::net::Ipv6Addr;

    use crate::{ALL_RPL_NODES, Eui64, MoteId, is_global, is_link_local, is_multicast};

    #[test]
    fn derived_eui64_uses_fixed_prefix() {
        let eui = Eui64::from_mote_id(MoteId(0x0102));
        assert_eq!(eui.to_string(), "00-12-4b-00-00-00-01-02");
    }

    #[test]
    fn parse_and_display_agree() {
        let eui: Eui64 = "00-12-4B-00-00-AB-CD-EF".parse().unwrap();
        assert_eq!(eui.to_string(), "00-12-4b-00-00-ab-cd-ef");
        assert!("00-12-4b".parse::<Eui64>().is_err());
        assert!("00-12-4b-00-00-ab-cd-ef-01".parse::<Eui64>().is_err());
        assert!("zz-12-4b-00-00-ab-cd-ef".parse::<Eui64>().is_err());
    }

    #[test]
    fn ipv6_prefixes() {
        let eui = Eui64::from_mote_id(MoteId(5));
        let ll = eui.link_local();
        let gl = eui.global();
        assert!(is_link_local(ll) && !is_global(ll));
        assert!(is_global(gl) && !is_link_local(gl));
        assert!(is_multicast(ALL_RPL_NODES) && !is_multicast(gl));
        assert_eq!(ll.segments()[0], 0xfe80);
        assert_eq!(gl.segments()[0], 0xfd00);
        assert_eq!(Eui64::from_ipv6(ll), Some(eui));
        assert_eq!(Eui64::from_ipv6(gl), Some(eui));
        assert_eq!(Eui64::from_ipv6(ALL_RPL_NODES), None);
        assert_eq!(ALL_RPL_NODES, "ff02::1a".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn serde_as_string() {
        let eui = Eui64::from_mote_id(MoteId(1));
        let json = serde_json::to_string(&eui).unwrap();
        assert_eq!(json, "\"00-12-4b-00-00-00-00-01\"");
        let back: Eui64 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, eui);
    }
}

#[cfg(test)]
mod settings {
    use serde_json::json;

    use crate::{ConnClass, Eui64, MoteId, Settings, TsError};

    #[test]
    fn default_is_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn run_length_keys_are_mutually_exclusive() {
        let both = json!({ "exec_numSlotframesPerRun": 10, "exec_minutesPerRun": 1.0 });
        assert!(matches!(Settings::from_json(both), Err(TsError::Config(_))));

        let neither = json!({ "exec_numMotes": 2 });
        assert!(matches!(Settings::from_json(neither), Err(TsError::Config(_))));

        let one = json!({ "exec_minutesPerRun": 1.0 });
        let s = Settings::from_json(one).unwrap();
        assert_eq!(s.total_slots(), 6000);
    }

    #[test]
    fn total_slots_from_slotframes() {
        let s = Settings {
            exec_num_slotframes_per_run: Some(20),
            tsch_slotframe_length:       101,
            ..Settings::default()
        };
        assert_eq!(s.total_slots(), 2020);
    }

    #[test]
    fn unknown_key_rejected() {
        let bad = json!({ "exec_numSlotframesPerRun": 10, "no_such_key": 1 });
        assert!(matches!(Settings::from_json(bad), Err(TsError::Config(_))));
    }

    #[test]
    fn queue_size_bounds() {
        let ok = Settings { tsch_tx_queue_size: -1, ..Settings::default() };
        ok.validate().unwrap();
        let bad = Settings { tsch_tx_queue_size: -2, ..Settings::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn duplicate_eui64_rejected() {
        let eui = Eui64::from_mote_id(MoteId(1));
        let s = Settings { exec_num_motes: 2, motes_eui64: vec![eui, eui], ..Settings::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn k7_requires_trace() {
        let s = Settings { conn_class: ConnClass::K7, ..Settings::default() };
        assert!(s.validate().is_err());
        let s = Settings { conn_trace: Some("t.k7.gz".into()), ..Settings::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn known_keys_are_json_names() {
        let keys = Settings::known_keys();
        assert!(keys.contains(&"exec_numMotes".to_string()));
        assert!(keys.contains(&"tsch_slotframeLength".to_string()));
        assert!(keys.contains(&"exec_minutesPerRun".to_string()));
        assert!(!keys.contains(&"exec_num_motes".to_string()));
    }

    #[test]
    fn msf_limits_checked() {
        let inverted = Settings {
            msf_lim_num_cells_used_low: 0.8,
            msf_lim_num_cells_used_high: 0.4,
            ..Settings::default()
        };
        assert!(matches!(inverted.validate(), Err(TsError::Config(_))));
        let bad_pdr = Settings { msf_relocate_pdr_thres: 1.5, ..Settings::default() };
        assert!(bad_pdr.validate().is_err());
        let no_period = Settings { msf_housekeeping_period: 0.0, ..Settings::default() };
        assert!(no_period.validate().is_err());

        let s = Settings::from_json(json!({
            "exec_numSlotframesPerRun": 10,
            "msf_limNumCellsUsedHigh": 0.9,
            "msf_minNumTx": 20
        }))
        .unwrap();
        assert_eq!(s.msf_lim_num_cells_used_high, 0.9);
        assert_eq!(s.msf_min_num_tx, 20);
        assert_eq!(s.msf_lim_num_cells_used_low, 0.25);
    }

    #[test]
    fn json_roundtrip_of_defaults() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        let back = Settings::from_json(value).unwrap();
        assert_eq!(back, Settings::default());
    }
}

#[cfg(test)]
mod log {
    use crate::{Asn, DropReason, LogEvent, LogRecord, LogSink, MemoryLog, MoteId, PacketInfo};

    fn packet() -> PacketInfo {
        PacketInfo {
            uid:     1,
            kind:    "DATA".into(),
            mac_src: None,
            mac_dst: None,
            net_src: None,
            net_dst: None,
            length:  90,
        }
    }

    #[test]
    fn record_serializes_flat() {
        let rec = LogRecord::new(
            Asn(42),
            Some(MoteId(3)),
            LogEvent::TschDrop { packet: packet(), reason: DropReason::MaxRetries },
        );
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["_asn"], 42);
        assert_eq!(v["_mote_id"], 3);
        assert_eq!(v["_type"], "tsch.drop");
        assert_eq!(v["reason"], "max_retries");
        assert_eq!(v["packet"]["type"], "DATA");
    }

    #[test]
    fn record_without_mote_omits_field() {
        let rec = LogRecord::new(Asn(0), None, LogEvent::SimEnd { num_motes: 2 });
        let line = serde_json::to_string(&rec).unwrap();
        assert!(!line.contains("_mote_id"));
        let back: LogRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn type_names_are_listed() {
        let ev = LogEvent::SecjoinJoined {};
        assert!(LogEvent::ALL_TYPES.contains(&ev.type_name()));
        assert_eq!(LogEvent::ALL_TYPES.len(), 30);
    }

    #[test]
    fn memory_log_filters() {
        let mut log = MemoryLog::new();
        log.log(LogRecord::new(Asn(1), Some(MoteId(1)), LogEvent::SecjoinJoined {}));
        log.log(LogRecord::new(Asn(2), Some(MoteId(2)), LogEvent::SecjoinJoined {}));
        log.log(LogRecord::new(Asn(3), Some(MoteId(1)), LogEvent::TschDesynced {}));
        assert_eq!(log.count("secjoin.joined"), 2);
        assert_eq!(log.of_mote(MoteId(1)).count(), 2);
    }
}
