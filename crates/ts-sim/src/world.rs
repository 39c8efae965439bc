//! Everything a run simulates: the motes, the connectivity matrix and the
//! shared per-run state their handlers borrow through a [`Ctx`].

use std::collections::VecDeque;

use ts_connectivity::{Connectivity, Listener, PropagationParams, Transmission, propagate};
use ts_core::{Asn, LogEvent, LogRecord, LogSink, MoteId, Settings, SimRng};
use ts_engine::{EventQueue, IntraSlotOrder};
use ts_stack::tsch::MINIMAL_HANDLE;
use ts_stack::{Cell, CellOptions, Ctx, EventTag, LinkType, Mote, NetworkInfo, RadioState, RxFrame};

use crate::{SimError, SimResult};

/// The non-mote half of the world.  Kept apart from the motes so a mote can
/// be borrowed mutably next to the context it runs in.
pub struct Env {
    pub settings: Settings,
    pub net:      NetworkInfo,
    rng:          SimRng,
    next_uid:     u64,
}

impl Env {
    pub(crate) fn new(settings: Settings, net: NetworkInfo, rng: SimRng) -> Self {
        Env { settings, net, rng, next_uid: 0 }
    }

    pub(crate) fn ctx<'a>(
        &'a mut self,
        asn:   Asn,
        queue: &'a mut EventQueue<EventTag>,
        log:   &'a mut dyn LogSink,
    ) -> Ctx<'a> {
        Ctx {
            asn,
            settings: &self.settings,
            queue,
            rng: &mut self.rng,
            log,
            net: &self.net,
            next_uid: &mut self.next_uid,
        }
    }
}

pub struct World {
    pub motes:        Vec<Mote>,
    pub connectivity: Connectivity,
    pub env:          Env,
}

impl World {
    /// Log the resolved settings, power every mote on and, if configured,
    /// rig the forced initial topology.  Runs at ASN 0.
    pub(crate) fn boot(&mut self, queue: &mut EventQueue<EventTag>, log: &mut dyn LogSink) -> SimResult<()> {
        log.log(LogRecord::new(Asn::ZERO, None, LogEvent::Config {
            settings: Box::new(self.env.settings.clone()),
        }));
        for mote in &mut self.motes {
            mote.boot(&mut self.env.ctx(Asn::ZERO, queue, log));
        }
        if self.env.settings.force_initial_state {
            self.force_initial_state(queue, log)?;
        }
        self.schedule_connectivity_update(queue, Asn::ZERO);
        Ok(())
    }

    /// Dispatch one fired event.
    pub(crate) fn handle(
        &mut self,
        queue: &mut EventQueue<EventTag>,
        log:   &mut dyn LogSink,
        asn:   Asn,
        tag:   EventTag,
    ) -> SimResult<()> {
        match tag {
            EventTag::Propagate => self.propagate(queue, log, asn),
            EventTag::ConnectivityUpdate => self.update_connectivity(queue, asn),
            EventTag::Mote(id, timer) => {
                let mote = self.motes.get_mut(id.index()).ok_or(SimError::UnknownMote(id))?;
                mote.on_timer(&mut self.env.ctx(asn, queue, log), timer);
            }
        }
        Ok(())
    }

    /// Final `radio.stats` of every mote, then `sim.end`.
    pub(crate) fn finish(&mut self, queue: &mut EventQueue<EventTag>, log: &mut dyn LogSink, asn: Asn) {
        for mote in &self.motes {
            mote.log_radio_stats(&mut self.env.ctx(asn, queue, log));
        }
        log.log(LogRecord::new(asn, None, LogEvent::SimEnd { num_motes: self.motes.len() as u32 }));
    }

    // ── Propagation ──────────────────────────────────────────────────────────

    /// Resolve the slot: collect what every radio does, let the
    /// connectivity model decide who hears what, then report back to the
    /// listeners (ascending id) and to the transmitters.
    fn propagate(&mut self, queue: &mut EventQueue<EventTag>, log: &mut dyn LogSink, asn: Asn) {
        let params = PropagationParams { simulate_ack_drop: self.env.settings.conn_simulate_ack_drop };
        let mut transmissions = Vec::new();
        let mut frames = Vec::new();
        let mut listeners = Vec::new();

        for mote in &self.motes {
            let clock_offset_us = mote.clock_offset_us(asn, &self.env.settings);
            match &mote.radio.state {
                RadioState::Tx { packet, channel } => {
                    let dst = if packet.is_broadcast() {
                        None
                    } else {
                        // Nobody accepts a frame for an address outside the network.
                        Some(self.env.net.mote_of(packet.mac.dst).unwrap_or(MoteId::INVALID))
                    };
                    transmissions.push(Transmission { src: mote.id, dst, channel: *channel, clock_offset_us });
                    frames.push((**packet).clone());
                }
                RadioState::Rx { channel } => {
                    listeners.push(Listener { mote: mote.id, channel: *channel, clock_offset_us });
                }
                RadioState::Off => {}
            }
        }

        let outcome = propagate(&self.connectivity.matrix, &transmissions, &listeners, params, &mut self.env.rng);

        for (li, listener) in listeners.iter().enumerate() {
            let frame = outcome.received[li].map(|ti| RxFrame {
                packet:              frames[ti].clone(),
                channel:             listener.channel,
                src_clock_offset_us: transmissions[ti].clock_offset_us,
            });
            let Some(mote) = self.motes.get_mut(listener.mote.index()) else {
                continue;
            };
            mote.tsch_rx_done(&mut self.env.ctx(asn, queue, log), frame);
        }

        for (ti, tx) in transmissions.iter().enumerate() {
            // The ACK carries the receiver's clock offset.
            let ack = outcome.acked[ti].then(|| {
                listeners
                    .iter()
                    .find(|l| Some(l.mote) == tx.dst)
                    .map_or(0.0, |l| l.clock_offset_us)
            });
            let Some(mote) = self.motes.get_mut(tx.src.index()) else {
                continue;
            };
            mote.tsch_tx_done(&mut self.env.ctx(asn, queue, log), ack);
        }
    }

    // ── Connectivity updates ─────────────────────────────────────────────────

    pub(crate) fn schedule_connectivity_update(&self, queue: &mut EventQueue<EventTag>, now: Asn) {
        if let Some(t) = self.connectivity.next_update_s() {
            let at = Asn(self.env.settings.slot_clock().slots_for(t)).max(now + 1);
            queue.schedule_at(at, IntraSlotOrder::StartSlot, EventTag::ConnectivityUpdate);
        }
    }

    fn update_connectivity(&mut self, queue: &mut EventQueue<EventTag>, asn: Asn) {
        let now_s = self.env.settings.slot_clock().seconds_at(asn);
        self.connectivity.advance(now_s);
        self.schedule_connectivity_update(queue, asn);
    }

    // ── Forced initial state ─────────────────────────────────────────────────

    /// Synchronize, join and attach every reachable mote breadth-first from
    /// the root, giving each child one dedicated TX cell to its parent (and
    /// the matching RX cell at the parent) in the minimal slotframe.
    fn force_initial_state(&mut self, queue: &mut EventQueue<EventTag>, log: &mut dyn LogSink) -> SimResult<()> {
        let asn = Asn::ZERO;
        let length = self.env.settings.tsch_slotframe_length;
        let num_channels = self.env.settings.tsch_hopping_sequence.len().max(1) as u32;
        let mut visited = vec![false; self.motes.len()];
        let Some(root_seen) = visited.first_mut() else {
            return Ok(());
        };
        *root_seen = true;

        let mut frontier = VecDeque::from([MoteId::ROOT]);
        let mut next_slot = 1;
        let mut attached = 0;

        while let Some(parent_id) = frontier.pop_front() {
            for child_id in self.connectivity.matrix.neighbors(parent_id) {
                if visited.get(child_id.index()).copied().unwrap_or(true) {
                    continue;
                }
                visited[child_id.index()] = true;

                let (parent_eui, parent_rank) = {
                    let parent = &self.motes[parent_id.index()];
                    (parent.eui64, parent.rpl_rank())
                };
                let child_eui = {
                    let child = &mut self.motes[child_id.index()];
                    let mut ctx = self.env.ctx(asn, queue, log);
                    child.force_sync_and_join(&mut ctx, Some(parent_eui));
                    child.rpl_force_parent(&mut ctx, parent_eui, parent_rank);
                    child.eui64
                };

                if next_slot < length {
                    let channel = (next_slot % num_channels) as u8;
                    let tx = Cell::new(next_slot, channel, CellOptions::TX, Some(parent_eui), LinkType::Normal);
                    let rx = Cell::new(next_slot, channel, CellOptions::RX, Some(child_eui), LinkType::Normal);
                    self.motes[child_id.index()].tsch_add_cell(&mut self.env.ctx(asn, queue, log), MINIMAL_HANDLE, tx)?;
                    self.motes[parent_id.index()].tsch_add_cell(&mut self.env.ctx(asn, queue, log), MINIMAL_HANDLE, rx)?;
                    next_slot += 1;
                } else {
                    tracing::warn!(mote = %child_id, "slotframe full; forced cell not installed");
                }

                if let Some(root) = self.motes.first_mut() {
                    root.rpl_add_parent_child(child_eui.global(), parent_eui.global());
                }
                attached += 1;
                frontier.push_back(child_id);
            }
        }

        tracing::debug!(attached, total = self.motes.len(), "forced initial state installed");
        Ok(())
    }
}
