//! Whole-network tests.

#[cfg(test)]
mod helpers {
    use ts_core::{ConnClass, Settings};

    use crate::{Sim, SimBuilder};

    pub fn settings(num_motes: u32, slotframes: u64) -> Settings {
        Settings {
            exec_num_motes: num_motes,
            exec_num_slotframes_per_run: Some(slotframes),
            conn_class: ConnClass::FullyMeshed,
            ..Settings::default()
        }
    }

    pub fn build(settings: Settings) -> Sim {
        SimBuilder::new(settings).build().expect("valid settings")
    }
}

#[cfg(test)]
mod lifecycle {
    use ts_core::{Asn, MemoryLog, Settings};

    use super::helpers::{build, settings};
    use crate::{EngineState, RunOutcome, SimBuilder, SimError};

    #[test]
    fn successful_run_ends_at_terminal_asn() {
        let mut sim = build(settings(3, 5));
        let mut log = MemoryLog::new();
        assert_eq!(sim.run(&mut log).unwrap(), RunOutcome::Finished);
        assert_eq!(sim.current_asn(), Asn(5 * 101));
        assert_eq!(sim.state(), EngineState::Finished);

        assert_eq!(log.records.first().map(|r| r.type_name()), Some("config"));
        assert_eq!(log.records.last().map(|r| r.type_name()), Some("sim.end"));
        assert!(log.count("radio.stats") >= 3);
        assert_eq!(log.count("config"), 1);
    }

    #[test]
    fn finished_run_does_not_restart() {
        let mut sim = build(settings(2, 2));
        let mut log = MemoryLog::new();
        sim.run(&mut log).unwrap();
        let n = log.records.len();
        assert_eq!(sim.run(&mut log).unwrap(), RunOutcome::Finished);
        assert_eq!(log.records.len(), n);
    }

    #[test]
    fn pause_then_resume() {
        let mut sim = build(settings(3, 3));
        let mut log = MemoryLog::new();
        sim.pause_at(Asn(50)).unwrap();
        assert_eq!(sim.run(&mut log).unwrap(), RunOutcome::Paused(Asn(50)));
        assert_eq!(sim.current_asn(), Asn(50));
        assert!(log.records.iter().all(|r| r.asn < Asn(50)));

        sim.play();
        assert_eq!(sim.run(&mut log).unwrap(), RunOutcome::Finished);
        assert_eq!(sim.current_asn(), Asn(303));
    }

    #[test]
    fn abort_stops_before_terminal_asn() {
        let mut sim = build(settings(3, 3));
        let mut log = MemoryLog::new();
        sim.control().abort();
        assert_eq!(sim.run(&mut log).unwrap(), RunOutcome::Aborted);
        assert!(sim.current_asn() < sim.end_asn());
        assert_eq!(log.count("sim.end"), 0);
    }

    #[test]
    fn both_run_lengths_is_a_configuration_error() {
        let s = Settings { exec_minutes_per_run: Some(1.0), ..settings(2, 10) };
        assert!(matches!(SimBuilder::new(s).build(), Err(SimError::Settings(_))));
    }

    #[test]
    fn same_seed_same_log() {
        let run = || {
            let mut sim = build(Settings { exec_random_seed: 7, ..settings(4, 300) });
            let mut log = MemoryLog::new();
            sim.run(&mut log).unwrap();
            log.records
        };
        assert_eq!(run(), run());
    }
}

#[cfg(test)]
mod initial_state {
    use std::collections::BTreeSet;

    use ts_core::{AppClass, Asn, ConnClass, DropReason, LogEvent, MemoryLog, MoteId, Settings};
    use ts_stack::tsch::MINIMAL_HANDLE;
    use ts_stack::{CellOptions, Mote};

    use super::helpers::{build, settings};
    use crate::{RunOutcome, Sim};

    fn paused_at_start(settings: Settings, log: &mut MemoryLog) -> Sim {
        let mut sim = build(settings);
        sim.pause_at(Asn(1)).unwrap();
        assert_eq!(sim.run(log).unwrap(), RunOutcome::Paused(Asn(1)));
        sim
    }

    #[test]
    fn linear_chain_ranks() {
        let s = Settings { conn_class: ConnClass::Linear, force_initial_state: true, ..settings(3, 10) };
        let mut log = MemoryLog::new();
        let sim = paused_at_start(s, &mut log);
        let ranks: Vec<u16> = sim.motes().iter().map(Mote::rpl_rank).collect();
        assert_eq!(ranks, vec![256, 768, 1280]);

        let m = sim.motes();
        assert_eq!(m[1].rpl_preferred_parent(), Some(m[0].eui64));
        assert_eq!(m[2].rpl_preferred_parent(), Some(m[1].eui64));
        assert!(m.iter().all(|m| m.is_sync() && m.secjoin.joined));
        assert_eq!(log.records[0].type_name(), "config");
    }

    #[test]
    fn forced_cells_come_in_pairs() {
        let s = Settings { conn_class: ConnClass::Linear, force_initial_state: true, ..settings(3, 10) };
        let mut log = MemoryLog::new();
        let sim = paused_at_start(s, &mut log);
        let m = sim.motes();
        for (child, parent) in [(1, 0), (2, 1)] {
            let tx = m[child].tsch.get_cells(Some(m[parent].eui64), Some(MINIMAL_HANDLE));
            assert_eq!(tx.len(), 1);
            let (_, cell) = &tx[0];
            assert_eq!(cell.options, CellOptions::TX);
            let rx = m[parent].tsch.get_cells(Some(m[child].eui64), Some(MINIMAL_HANDLE));
            assert_eq!(rx.len(), 1);
            assert_eq!(rx[0].1.slot_offset, cell.slot_offset);
            assert_eq!(rx[0].1.channel_offset, cell.channel_offset);
            assert_eq!(rx[0].1.options, CellOptions::RX);
        }
        let root_route = m[0].rpl_compute_source_route(m[2].eui64.global());
        assert_eq!(root_route, Some(vec![m[1].eui64.global(), m[2].eui64.global()]));
    }

    #[test]
    fn exhausted_retries_give_one_plus_max_attempts() {
        let s = Settings {
            force_initial_state: true,
            tsch_max_tx_retries: 5,
            tsch_keep_alive_interval: 0.0,
            app: AppClass::AppBurst,
            app_burst_timestamp: Some(0.05),
            app_burst_num_packets: 1,
            ..settings(2, 20)
        };
        let mut log = MemoryLog::new();
        let mut sim = paused_at_start(s, &mut log);
        for ch in sim.settings().tsch_hopping_sequence.clone() {
            sim.connectivity_mut().matrix.set_pdr_both_directions(MoteId(0), MoteId(1), ch, 0.0);
        }
        sim.play();
        assert_eq!(sim.run(&mut log).unwrap(), RunOutcome::Finished);

        let uid = log
            .of_type("app.tx")
            .find_map(|r| match &r.event {
                LogEvent::AppTx { packet } if r.mote_id == Some(MoteId(1)) => Some(packet.uid),
                _ => None,
            })
            .expect("burst packet generated");
        let attempts = log
            .of_type("tsch.txdone")
            .filter(|r| matches!(&r.event, LogEvent::TschTxDone { packet, is_acked: false, .. } if packet.uid == uid))
            .count();
        assert_eq!(attempts, 6);
        assert!(log.of_type("tsch.drop").any(|r| matches!(
            &r.event,
            LogEvent::TschDrop { packet, reason: DropReason::MaxRetries } if packet.uid == uid
        )));
    }

    #[test]
    fn negotiated_cells_agree_on_both_ends() {
        let s = Settings { force_initial_state: true, exec_random_seed: 3, ..settings(4, 2000) };
        let mut sim = build(s);
        let mut log = MemoryLog::new();
        sim.run(&mut log).unwrap();

        let motes = sim.motes();
        for child in motes.iter().filter(|m| !m.is_root) {
            let Some(parent_eui) = child.rpl_preferred_parent() else {
                continue;
            };
            let parent = motes.iter().find(|m| m.eui64 == parent_eui).unwrap();
            assert!(parent.rpl_rank() < child.rpl_rank());

            let tx: BTreeSet<(u32, u8)> = child
                .tsch
                .get_cells(Some(parent_eui), Some(MINIMAL_HANDLE))
                .into_iter()
                .filter(|(_, c)| c.is_tx())
                .map(|(_, c)| (c.slot_offset, c.channel_offset))
                .collect();
            let rx: BTreeSet<(u32, u8)> = parent
                .tsch
                .get_cells(Some(child.eui64), Some(MINIMAL_HANDLE))
                .into_iter()
                .filter(|(_, c)| c.is_rx())
                .map(|(_, c)| (c.slot_offset, c.channel_offset))
                .collect();
            assert_eq!(tx, rx, "schedules of {} and its parent differ", child.id);
            assert!(!tx.is_empty());
        }
        assert!(log.count("app.rx") > 0);
    }
}

#[cfg(test)]
mod joining {
    use ts_core::{MemoryLog, MoteId};
    use ts_stack::of::INFINITE_RANK;

    use super::helpers::{build, settings};

    #[test]
    fn pledge_synchronizes_joins_and_attaches() {
        // 15 minutes: plenty of EBs to catch on a random scan channel.
        let mut sim = build(settings(2, 9_000));
        let mut log = MemoryLog::new();
        sim.run(&mut log).unwrap();

        let pledge = MoteId(1);
        assert!(log.of_type("tsch.synced").any(|r| r.mote_id == Some(pledge)));
        assert!(log.of_type("secjoin.joined").any(|r| r.mote_id == Some(pledge)));

        let m = sim.motes();
        assert_eq!(m[1].rpl_preferred_parent(), Some(m[0].eui64));
        let rank = m[1].rpl_rank();
        assert!(rank > 256 && rank < INFINITE_RANK);
        assert!(log.count("rpl.dao.rx") > 0);
    }
}
