//! Unit tests for the connectivity matrix, its models and propagation.

#[cfg(test)]
mod helpers {
    use std::io::Write;
    use std::path::PathBuf;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use ts_core::Settings;

    pub const CHANNELS: [u8; 4] = [11, 12, 13, 14];

    pub fn settings(num_motes: u32) -> Settings {
        Settings {
            exec_num_motes:              num_motes,
            exec_num_slotframes_per_run: Some(10),
            tsch_slotframe_length:       101,
            tsch_hopping_sequence:       CHANNELS.to_vec(),
            ..Settings::default()
        }
    }

    /// Write a gzipped two-node trace covering `[start, stop]`.
    pub fn write_trace(dir: &tempfile::TempDir, channels: &[u8], stop: &str) -> PathBuf {
        let path = dir.path().join("trace.k7.gz");
        let file = std::fs::File::create(&path).unwrap();
        let mut gz = GzEncoder::new(file, Compression::default());
        let header = serde_json::json!({
            "node_count": 2,
            "channels": channels,
            "start_date": "2020-01-01 00:00:00",
            "stop_date": stop,
            "location": "lab",
        });
        writeln!(gz, "{header}").unwrap();
        writeln!(gz, "timestamp,src,dst,channel,pdr,rssi").unwrap();
        for &ch in channels {
            writeln!(gz, "2020-01-01 00:00:00,0,1,{ch},0.9,-85").unwrap();
            writeln!(gz, "2020-01-01 00:00:00,1,0,{ch},0.8,").unwrap();
        }
        writeln!(gz, "2020-01-01 00:00:05.5,0,1,11,0.0,").unwrap();
        gz.finish().unwrap();
        path
    }
}

#[cfg(test)]
mod matrix {
    use ts_core::MoteId;

    use crate::{ConnectivityMatrix, LINK_NONE, LINK_NONE_RSSI, Link};

    #[test]
    fn defaults_to_no_link() {
        let m = ConnectivityMatrix::new(3, vec![11, 12]);
        assert_eq!(m.get(MoteId(0), MoteId(1), 11), LINK_NONE);
        // Unknown channel and unknown mote read as no link.
        assert_eq!(m.get_pdr(MoteId(0), MoteId(1), 26), 0.0);
        assert_eq!(m.get_pdr(MoteId(0), MoteId(9), 11), 0.0);
    }

    #[test]
    fn zero_pdr_iff_none_rssi() {
        let mut m = ConnectivityMatrix::new(2, vec![11]);
        m.set_link(MoteId(0), MoteId(1), 11, Link { pdr: 0.0, rssi: -50.0 });
        assert_eq!(m.get_rssi(MoteId(0), MoteId(1), 11), LINK_NONE_RSSI);
        m.set_link(MoteId(0), MoteId(1), 11, Link { pdr: 0.5, rssi: LINK_NONE_RSSI });
        assert!(m.get_rssi(MoteId(0), MoteId(1), 11) > LINK_NONE_RSSI);
    }

    #[test]
    fn both_directions() {
        let mut m = ConnectivityMatrix::new(3, vec![11, 12]);
        m.set_pdr_both_directions(MoteId(0), MoteId(2), 12, 0.7);
        assert_eq!(m.get_pdr(MoteId(0), MoteId(2), 12), 0.7);
        assert_eq!(m.get_pdr(MoteId(2), MoteId(0), 12), 0.7);
        assert_eq!(m.get_pdr(MoteId(0), MoteId(2), 11), 0.0);
        assert_eq!(m.neighbors(MoteId(0)), vec![MoteId(2)]);
        assert!((m.mean_pdr(MoteId(0), MoteId(2)) - 0.35).abs() < 1e-9);
    }

    #[test]
    fn self_link_is_none() {
        let mut m = ConnectivityMatrix::new(2, vec![11]);
        m.set_link(MoteId(1), MoteId(1), 11, Link { pdr: 1.0, rssi: -10.0 });
        assert_eq!(m.get_pdr(MoteId(1), MoteId(1), 11), 0.0);
    }
}

#[cfg(test)]
mod models {
    use ts_core::{MoteId, SimRng};

    use super::helpers::*;
    use crate::{Connectivity, ConnectivityModel, FullyMeshed, Linear, RandomTopology, pister};

    #[test]
    fn fully_meshed() {
        let mut rng = SimRng::new(1);
        let c = Connectivity::with_model(&settings(4), Box::new(FullyMeshed), &mut rng).unwrap();
        for &ch in &CHANNELS {
            assert_eq!(c.matrix.get_pdr(MoteId(0), MoteId(3), ch), 1.0);
            assert_eq!(c.matrix.get_pdr(MoteId(3), MoteId(1), ch), 1.0);
        }
        assert_eq!(c.model_name(), "FullyMeshed");
    }

    #[test]
    fn linear_chain() {
        let mut rng = SimRng::new(1);
        let c = Connectivity::with_model(&settings(4), Box::new(Linear), &mut rng).unwrap();
        assert_eq!(c.matrix.neighbors(MoteId(1)), vec![MoteId(0), MoteId(2)]);
        assert_eq!(c.matrix.neighbors(MoteId(3)), vec![MoteId(2)]);
        assert_eq!(c.matrix.get_pdr(MoteId(0), MoteId(2), 11), 0.0);
    }

    #[test]
    fn rssi_pdr_table_is_monotone() {
        assert_eq!(pister::rssi_to_pdr(-120.0), 0.0);
        assert_eq!(pister::rssi_to_pdr(-50.0), 1.0);
        let mut last = 0.0;
        for r in -97..=-79 {
            let p = pister::rssi_to_pdr(r as f64);
            assert!(p >= last);
            last = p;
        }
        let r = pister::pdr_to_rssi(0.5);
        assert!((pister::rssi_to_pdr(r) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn friis_decreases_with_distance() {
        assert!(pister::friis_rssi(10.0) > pister::friis_rssi(100.0));
    }

    #[test]
    fn random_topology_meets_neighbour_floor() {
        let mut s = settings(8);
        s.conn_random_square_side = 0.2;
        s.conn_random_init_min_pdr = 0.5;
        s.conn_random_init_min_neighbors = 2;
        let mut rng = SimRng::new(42);
        let mut model = RandomTopology::from_settings(&s);
        let mut m = crate::ConnectivityMatrix::new(8, CHANNELS.to_vec());
        model.init(&mut m, &mut rng).unwrap();
        assert_eq!(model.positions.len(), 8);
        for id in 1..8u32 {
            let good = (0..id)
                .filter(|&j| m.get_pdr(MoteId(id), MoteId(j), 11) >= 0.5)
                .count();
            assert!(good >= 2usize.min(id as usize), "mote {id} has {good}");
            // Symmetric, identical on every channel.
            let p = m.get_pdr(MoteId(id), MoteId(0), 11);
            assert_eq!(p, m.get_pdr(MoteId(0), MoteId(id), 11));
            assert_eq!(p, m.get_pdr(MoteId(id), MoteId(0), 14));
        }
    }

    #[test]
    fn random_topology_is_seeded() {
        let s = settings(5);
        let run = |seed| {
            let mut rng = SimRng::new(seed);
            let c = Connectivity::with_model(&s, Box::new(RandomTopology::from_settings(&s)), &mut rng)
                .unwrap();
            (0..5u32).map(|i| c.matrix.get_pdr(MoteId(0), MoteId(i), 11)).collect::<Vec<_>>()
        };
        assert_eq!(run(3), run(3));
    }
}

#[cfg(test)]
mod k7 {
    use ts_core::{ConnClass, MoteId, SimRng};

    use super::helpers::*;
    use crate::{Connectivity, ConnectivityError, K7Trace};

    fn k7_settings(path: &std::path::Path, hopping: &[u8]) -> ts_core::Settings {
        let mut s = settings(2);
        s.conn_class = ConnClass::K7;
        s.conn_trace = Some(path.display().to_string());
        s.tsch_hopping_sequence = hopping.to_vec();
        s
    }

    #[test]
    fn trace_exactly_as_long_as_run_is_accepted() {
        // 10 slotframes x 101 slots x 10 ms = 10.1 s.
        let dir = tempfile::tempdir().unwrap();
        let path = write_trace(&dir, &CHANNELS, "2020-01-01 00:00:10.1");
        let s = k7_settings(&path, &CHANNELS);
        let mut rng = SimRng::new(0);
        let c = Connectivity::from_settings(&s, &mut rng).unwrap();
        assert_eq!(c.model_name(), "K7");
        assert!((c.matrix.get_pdr(MoteId(0), MoteId(1), 12) - 0.9).abs() < 1e-9);
        assert!((c.matrix.get_pdr(MoteId(1), MoteId(0), 12) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn trace_one_slot_short_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trace(&dir, &CHANNELS, "2020-01-01 00:00:10.09");
        let s = k7_settings(&path, &CHANNELS);
        let mut rng = SimRng::new(0);
        assert!(matches!(
            Connectivity::from_settings(&s, &mut rng),
            Err(ConnectivityError::Config(_))
        ));
    }

    #[test]
    fn hopping_sequence_must_be_covered() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trace(&dir, &CHANNELS, "2020-01-01 01:00:00");
        let mut rng = SimRng::new(0);

        // Equal: ok.
        assert!(Connectivity::from_settings(&k7_settings(&path, &CHANNELS), &mut rng).is_ok());
        // Proper subset: ok.
        assert!(Connectivity::from_settings(&k7_settings(&path, &[11, 13]), &mut rng).is_ok());
        // Superset: configuration error.
        let superset = [11, 12, 13, 14, 15];
        assert!(matches!(
            Connectivity::from_settings(&k7_settings(&path, &superset), &mut rng),
            Err(ConnectivityError::Config(_))
        ));
    }

    #[test]
    fn rows_replay_as_time_advances() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trace(&dir, &CHANNELS, "2020-01-01 01:00:00");
        let s = k7_settings(&path, &CHANNELS);
        let mut rng = SimRng::new(0);
        let mut c = Connectivity::from_settings(&s, &mut rng).unwrap();
        assert_eq!(c.next_update_s(), Some(5.5));
        assert_eq!(c.advance(5.0), Some(5.5));
        assert!(c.matrix.get_pdr(MoteId(0), MoteId(1), 11) > 0.0);
        assert_eq!(c.advance(5.5), None);
        assert_eq!(c.matrix.get_pdr(MoteId(0), MoteId(1), 11), 0.0);
        assert!(c.matrix.get_pdr(MoteId(0), MoteId(1), 12) > 0.0);
    }

    #[test]
    fn too_few_nodes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trace(&dir, &CHANNELS, "2020-01-01 01:00:00");
        let mut s = k7_settings(&path, &CHANNELS);
        s.exec_num_motes = 3;
        assert!(matches!(K7Trace::open(&path, &s), Err(ConnectivityError::Config(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let s = settings(2);
        assert!(matches!(
            K7Trace::open("/nonexistent/trace.k7.gz", &s),
            Err(ConnectivityError::Io(_))
        ));
    }
}

#[cfg(test)]
mod propagation {
    use ts_core::{MoteId, SimRng};

    use crate::{ConnectivityMatrix, Listener, PropagationParams, Transmission, propagate};

    fn tx(src: u32, dst: Option<u32>, channel: u8) -> Transmission {
        Transmission { src: MoteId(src), dst: dst.map(MoteId), channel, clock_offset_us: 0.0 }
    }

    fn rx(mote: u32, channel: u8) -> Listener {
        Listener { mote: MoteId(mote), channel, clock_offset_us: 0.0 }
    }

    fn meshed(n: usize, pdr: f64) -> ConnectivityMatrix {
        let mut m = ConnectivityMatrix::new(n, vec![11, 12]);
        for a in 0..n as u32 {
            for b in 0..n as u32 {
                for ch in [11, 12] {
                    m.set_pdr_both_directions(MoteId(a), MoteId(b), ch, pdr);
                }
            }
        }
        m
    }

    #[test]
    fn perfect_unicast_is_received_and_acked() {
        let m = meshed(2, 1.0);
        let mut rng = SimRng::new(1);
        let out = propagate(&m, &[tx(0, Some(1), 11)], &[rx(1, 11)], PropagationParams::default(), &mut rng);
        assert_eq!(out.received, vec![Some(0)]);
        assert_eq!(out.acked, vec![true]);
    }

    #[test]
    fn wrong_channel_or_zero_pdr_is_lost() {
        let m = meshed(2, 1.0);
        let mut rng = SimRng::new(1);
        let out = propagate(&m, &[tx(0, Some(1), 11)], &[rx(1, 12)], PropagationParams::default(), &mut rng);
        assert_eq!(out.received, vec![None]);
        assert_eq!(out.acked, vec![false]);

        let m = meshed(2, 0.0);
        let out = propagate(&m, &[tx(0, Some(1), 11)], &[rx(1, 11)], PropagationParams::default(), &mut rng);
        assert_eq!(out.received, vec![None]);
    }

    #[test]
    fn concurrent_transmissions_collide() {
        let m = meshed(3, 1.0);
        let mut rng = SimRng::new(1);
        let out = propagate(
            &m,
            &[tx(0, Some(2), 11), tx(1, None, 11)],
            &[rx(2, 11)],
            PropagationParams::default(),
            &mut rng,
        );
        assert_eq!(out.received, vec![None]);
        assert_eq!(out.acked, vec![false, false]);
    }

    #[test]
    fn unicast_to_someone_else_is_ignored() {
        let m = meshed(3, 1.0);
        let mut rng = SimRng::new(1);
        let out = propagate(
            &m,
            &[tx(0, Some(1), 11)],
            &[rx(1, 11), rx(2, 11)],
            PropagationParams::default(),
            &mut rng,
        );
        assert_eq!(out.received, vec![Some(0), None]);
    }

    #[test]
    fn broadcast_reaches_all_and_is_not_acked() {
        let m = meshed(3, 1.0);
        let mut rng = SimRng::new(1);
        let out = propagate(&m, &[tx(0, None, 12)], &[rx(2, 12), rx(1, 12)], PropagationParams::default(), &mut rng);
        assert_eq!(out.received, vec![Some(0), Some(0)]);
        assert_eq!(out.acked, vec![false]);
    }

    #[test]
    fn clock_offset_beyond_guard_is_missed() {
        let m = meshed(2, 1.0);
        let mut rng = SimRng::new(1);
        let mut listener = rx(1, 11);
        listener.clock_offset_us = 5000.0;
        let out = propagate(&m, &[tx(0, Some(1), 11)], &[listener], PropagationParams::default(), &mut rng);
        assert_eq!(out.received, vec![None]);
    }

    #[test]
    fn ack_drop_uses_reverse_link() {
        let mut m = ConnectivityMatrix::new(2, vec![11]);
        m.set_pdr_both_directions(MoteId(0), MoteId(1), 11, 1.0);
        m.set_link(MoteId(1), MoteId(0), 11, crate::LINK_NONE);
        let mut rng = SimRng::new(1);
        let params = PropagationParams { simulate_ack_drop: true };
        let out = propagate(&m, &[tx(0, Some(1), 11)], &[rx(1, 11)], params, &mut rng);
        assert_eq!(out.received, vec![Some(0)]);
        assert_eq!(out.acked, vec![false]);
    }

    #[test]
    fn lossy_link_delivers_about_pdr() {
        let m = meshed(2, 0.5);
        let mut rng = SimRng::new(9);
        let delivered = (0..2000)
            .filter(|_| {
                propagate(&m, &[tx(0, None, 11)], &[rx(1, 11)], PropagationParams::default(), &mut rng)
                    .received[0]
                    .is_some()
            })
            .count();
        assert!((800..1200).contains(&delivered), "delivered {delivered}");
    }
}
