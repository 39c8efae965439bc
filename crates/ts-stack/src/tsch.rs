//! TSCH: slotframes, the per-slot action, retries, backoff, queueing,
//! synchronization and keep-alives.
//!
//! # Per-slot action
//!
//! A synchronized mote wakes (at `START_SLOT`) only in slots where one of
//! its slotframes has a cell.  It picks at most one cell:
//!
//! 1. TX cells with a frame to send win, dedicated before shared, ties in
//!    `(handle, slot_offset, channel_offset)` order.  A unicast frame on a
//!    shared cell still in backoff skips the cell and counts down.
//! 2. With nothing to send, an advertising cell may carry an EB.
//! 3. Otherwise the first RX cell listens.
//!
//! The chosen activity is resolved by the propagation step of the same slot,
//! which calls back into [`Mote::tsch_tx_done`] / [`Mote::tsch_rx_done`].
//!
//! An unsynchronized mote listens for EBs on a random channel every slot.

use std::collections::{BTreeMap, BTreeSet};

use ts_core::{Asn, DropReason, Eui64, LogEvent, Settings, SimRng};
use ts_engine::IntraSlotOrder;

use crate::clock::Clock;
use crate::slotframe::{Cell, CellOptions, LinkType, Slotframe};
use crate::txqueue::{Enqueued, TxQueue};
use crate::{Ctx, Mote, Packet, PacketType, Payload, StackError, StackResult, Timer};

pub const MIN_BE: u8 = 1;
pub const MAX_BE: u8 = 7;
/// A mote that hears nothing from its time source for this long desyncs.
pub const DESYNC_TIMEOUT_SLOTS: u64 = 1750;
/// Handle of the minimal slotframe (also home of negotiated cells).
pub const MINIMAL_HANDLE: u8 = 0;

/// A frame delivered by the propagation step.
#[derive(Clone, Debug)]
pub struct RxFrame {
    pub packet:              Packet,
    pub channel:             u8,
    pub src_clock_offset_us: f64,
}

/// What the mote does in the current slot.
#[derive(Clone, Debug)]
pub struct ActiveSlot {
    pub handle:  Option<u8>,
    /// `None` for pending-bit slots and EB scanning.
    pub cell:    Option<Cell>,
    pub channel: u8,
    pub tx_uid:  Option<u64>,
}

#[derive(Clone, Debug)]
struct PendingBit {
    asn:     Asn,
    peer:    Eui64,
    channel: u8,
    tx:      bool,
}

#[derive(Copy, Clone, Debug)]
struct EbCandidate {
    join_metric:     u16,
    clock_offset_us: f64,
}

#[derive(Debug)]
pub struct Tsch {
    pub is_sync:          bool,
    pub slotframes:       BTreeMap<u8, Slotframe>,
    pub tx_queue:         TxQueue,
    pub clock:            Clock,
    pub backoff_exponent: u8,
    /// Neighbour this mote keeps its clock aligned to.
    pub clock_source:     Option<Eui64>,
    eb_candidates:        BTreeMap<Eui64, EbCandidate>,
    active:               Option<ActiveSlot>,
    pending:              Option<PendingBit>,
}

impl Tsch {
    pub fn new(settings: &Settings, clock: Clock) -> Self {
        Tsch {
            is_sync:          false,
            slotframes:       BTreeMap::new(),
            tx_queue:         TxQueue::new(settings.tsch_tx_queue_size),
            clock,
            backoff_exponent: MIN_BE,
            clock_source:     None,
            eb_candidates:    BTreeMap::new(),
            active:           None,
            pending:          None,
        }
    }

    pub(crate) fn eb_candidates_clear(&mut self) {
        self.eb_candidates.clear();
    }

    pub fn slotframe(&self, handle: u8) -> Option<&Slotframe> {
        self.slotframes.get(&handle)
    }

    /// Cells matching the optional neighbour and slotframe filters, with
    /// their slotframe handle.
    pub fn get_cells(&self, mac_addr: Option<Eui64>, handle: Option<u8>) -> Vec<(u8, Cell)> {
        self.slotframes
            .iter()
            .filter(|(h, _)| handle.map_or(true, |want| want == **h))
            .flat_map(|(h, sf)| sf.cells().map(move |c| (*h, c.clone())))
            .filter(|(_, c)| mac_addr.is_none() || c.mac_addr == mac_addr)
            .collect()
    }

    pub fn get_available_slots(&self, handle: u8) -> Vec<u32> {
        self.slotframes.get(&handle).map_or_else(Vec::new, |sf| sf.available_slots())
    }

    /// No cell of any slotframe uses `slot_offset`.
    pub fn is_slot_free(&self, slot_offset: u32) -> bool {
        self.slotframes.values().all(|sf| sf.is_slot_free(slot_offset % sf.length))
    }

    pub fn has_tx_cell_to(&self, dst: Eui64) -> bool {
        self.slotframes
            .values()
            .any(|sf| sf.cells_with(Some(dst)).any(|c| c.is_tx()))
    }

    /// Slots from `asn` to the next slot with any cell.
    fn slots_to_next_cell(&self, asn: Asn) -> Option<u64> {
        self.slotframes
            .values()
            .filter_map(|sf| sf.slots_to_next_cell(asn.slot_offset(sf.length)))
            .min()
    }

    fn cell_mut(&mut self, handle: u8, cell: &Cell) -> Option<&mut Cell> {
        self.slotframes.get_mut(&handle)?.find_mut(cell)
    }

    /// First queued frame `cell` may carry.
    fn frame_for_cell(&self, cell: &Cell) -> Option<&Packet> {
        match cell.mac_addr {
            Some(n) => self.tx_queue.iter().find(|p| p.mac.dst == n),
            None => self
                .tx_queue
                .iter()
                .find(|p| p.is_broadcast() || !self.has_tx_cell_to(p.mac.dst)),
        }
    }

    /// Pick the TX cell and frame for this slot, counting down backoff.
    fn select_tx(&mut self, asn: Asn) -> Option<(u8, Cell, u64)> {
        let mut dedicated: Option<(u8, Cell, u64)> = None;
        let mut shared: Option<(u8, Cell, u64)> = None;
        let mut backing_off: BTreeSet<u64> = BTreeSet::new();

        for (&handle, sf) in &self.slotframes {
            let mut cells: Vec<&Cell> = sf.cells_at(asn.slot_offset(sf.length)).iter().collect();
            cells.sort_by_key(|c| c.channel_offset);
            for cell in cells.into_iter().filter(|c| c.is_tx()) {
                let Some(frame) = self.frame_for_cell(cell) else {
                    continue;
                };
                if cell.is_shared() && !frame.is_broadcast() && frame.backoff_remaining_delay > 0 {
                    backing_off.insert(frame.uid);
                    continue;
                }
                let pick = (handle, cell.clone(), frame.uid);
                if cell.is_dedicated_tx() {
                    dedicated.get_or_insert(pick);
                } else {
                    shared.get_or_insert(pick);
                }
            }
        }
        for uid in backing_off {
            if let Some(p) = self.tx_queue.get_mut(uid) {
                p.backoff_remaining_delay -= 1;
            }
        }
        dedicated.or(shared)
    }

    fn first_cell_at(&self, asn: Asn, pred: impl Fn(&Cell) -> bool) -> Option<(u8, Cell)> {
        self.slotframes.iter().find_map(|(&h, sf)| {
            let mut cells: Vec<&Cell> = sf.cells_at(asn.slot_offset(sf.length)).iter().collect();
            cells.sort_by_key(|c| c.channel_offset);
            cells.into_iter().find(|c| pred(c)).map(|c| (h, c.clone()))
        })
    }

    fn set_backoff_exponent(&mut self, be: u8) -> Option<(u8, u8)> {
        let old = self.backoff_exponent;
        self.backoff_exponent = be.clamp(MIN_BE, MAX_BE);
        (old != self.backoff_exponent).then_some((old, self.backoff_exponent))
    }

    /// Draw a new backoff delay after a failed shared-cell attempt.
    fn draw_backoff(&self, rng: &mut SimRng) -> u32 {
        rng.gen_range(0..(1u32 << self.backoff_exponent))
    }
}

// ── Slotframe and cell management ─────────────────────────────────────────────

impl Mote {
    pub fn tsch_add_slotframe(&mut self, ctx: &mut Ctx, handle: u8, length: u32) -> StackResult<()> {
        if self.tsch.slotframes.contains_key(&handle) {
            return Err(StackError::SlotframeExists(handle));
        }
        self.tsch.slotframes.insert(handle, Slotframe::new(handle, length));
        ctx.log(self.id, LogEvent::TschAddSlotframe { handle, length });
        Ok(())
    }

    pub fn tsch_delete_slotframe(&mut self, ctx: &mut Ctx, handle: u8) {
        if let Some(sf) = self.tsch.slotframes.remove(&handle) {
            for cell in sf.cells() {
                ctx.log(self.id, delete_cell_event(handle, cell));
            }
        }
        self.tsch_schedule_next_active(ctx);
    }

    pub fn tsch_add_cell(&mut self, ctx: &mut Ctx, handle: u8, cell: Cell) -> StackResult<()> {
        let sf = self
            .tsch
            .slotframes
            .get_mut(&handle)
            .ok_or(StackError::NoSuchSlotframe(handle))?;
        let event = LogEvent::TschAddCell {
            handle,
            slot_offset:    cell.slot_offset,
            channel_offset: cell.channel_offset,
            neighbor:       cell.mac_addr,
            cell_options:   cell.options.names(),
            link_type:      cell.link_type.as_str().to_string(),
        };
        sf.add_cell(cell)?;
        ctx.log(self.id, event);
        self.tsch_schedule_next_active(ctx);
        Ok(())
    }

    /// Delete a cell; returns it (with its counters) if it existed.
    pub fn tsch_delete_cell(&mut self, ctx: &mut Ctx, handle: u8, cell: &Cell) -> Option<Cell> {
        let removed = self.tsch.slotframes.get_mut(&handle)?.delete_cell(cell)?;
        ctx.log(self.id, delete_cell_event(handle, &removed));
        self.tsch_schedule_next_active(ctx);
        Some(removed)
    }

    fn install_minimal_cell(&mut self, ctx: &mut Ctx) -> StackResult<()> {
        if self.tsch.slotframes.contains_key(&MINIMAL_HANDLE) {
            return Ok(());
        }
        self.tsch_add_slotframe(ctx, MINIMAL_HANDLE, ctx.settings.tsch_slotframe_length)?;
        let minimal = Cell::new(
            0,
            0,
            CellOptions::TX | CellOptions::RX | CellOptions::SHARED,
            None,
            LinkType::Advertising,
        );
        self.tsch_add_cell(ctx, MINIMAL_HANDLE, minimal)
    }

    // ── Queue ─────────────────────────────────────────────────────────────

    /// Hand a frame to the MAC.  Returns `false` if it was dropped.
    pub fn tsch_enqueue(&mut self, ctx: &mut Ctx, mut packet: Packet) -> bool {
        if !self.tsch.is_sync {
            ctx.log(self.id, LogEvent::TschDrop { packet: packet.info(), reason: DropReason::NotJoined });
            return false;
        }
        packet.mac.src = self.eui64;
        packet.mac.retries_left = ctx.settings.tsch_max_tx_retries;
        packet.backoff_remaining_delay = 0;
        let dst = packet.mac.dst;
        match self.tsch.tx_queue.enqueue(packet) {
            Ok(Enqueued::Queued) => {}
            Ok(Enqueued::Evicted(victim)) => {
                ctx.log(self.id, LogEvent::TschDrop { packet: victim.info(), reason: DropReason::QueueFull });
            }
            Err(rejected) => {
                ctx.log(self.id, LogEvent::TschDrop { packet: rejected.info(), reason: DropReason::QueueFull });
                return false;
            }
        }
        if !dst.is_broadcast() {
            self.sf_on_frame_enqueued(ctx, dst);
        }
        true
    }

    // ── Scheduling of the per-slot action ─────────────────────────────────

    /// Re-arm `ActiveCell` for the next slot with something to do.
    pub fn tsch_schedule_next_active(&mut self, ctx: &mut Ctx) {
        let next = if !self.tsch.is_sync {
            Some(1)
        } else {
            let pending = self
                .tsch
                .pending
                .as_ref()
                .filter(|p| p.asn > ctx.asn)
                .map(|p| p.asn - ctx.asn);
            match (pending, self.tsch.slots_to_next_cell(ctx.asn)) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        };
        match next {
            Some(delta) => {
                ctx.schedule(self.id, Timer::ActiveCell, ctx.asn + delta, IntraSlotOrder::StartSlot);
            }
            None => {
                ctx.cancel(self.id, Timer::ActiveCell);
            }
        }
    }

    /// The per-slot action.  Runs at `START_SLOT`.
    pub(crate) fn on_active_cell(&mut self, ctx: &mut Ctx) {
        self.tsch.active = None;
        if !self.tsch.is_sync {
            // Scan for EBs on a random channel.
            let settings = ctx.settings;
            let seq = &settings.tsch_hopping_sequence;
            let channel = seq[ctx.rng.gen_range(0..seq.len())];
            self.start_listening(ctx, None, None, channel);
            return;
        }

        match self.tsch.pending.take() {
            Some(p) if p.asn == ctx.asn => {
                if !p.tx {
                    self.start_listening(ctx, None, None, p.channel);
                    return;
                }
                let uid = self.tsch.tx_queue.iter().find(|f| f.mac.dst == p.peer).map(|f| f.uid);
                if let Some(uid) = uid {
                    self.start_transmitting(ctx, None, None, p.channel, uid);
                    return;
                }
            }
            Some(p) if p.asn > ctx.asn => self.tsch.pending = Some(p),
            _ => {}
        }

        let selected = self.tsch.select_tx(ctx.asn);
        self.sf_on_slot(ctx, selected.as_ref().map(|(h, c, _)| (*h, c)));
        if let Some((handle, cell, uid)) = selected {
            let channel = ctx.channel_for(cell.channel_offset);
            self.start_transmitting(ctx, Some(handle), Some(cell), channel, uid);
            return;
        }

        if self.eb_eligible() {
            let adv = self
                .tsch
                .first_cell_at(ctx.asn, |c| c.is_tx() && c.link_type == LinkType::Advertising);
            if let Some((handle, cell)) = adv {
                if ctx.rng.gen_bool(ctx.settings.tsch_prob_bcast_eb_prob) {
                    let channel = ctx.channel_for(cell.channel_offset);
                    let eb = Packet::mac_only(
                        ctx.new_uid(),
                        PacketType::Eb,
                        self.eui64,
                        Eui64::BROADCAST,
                        Payload::Eb { join_metric: self.join_metric() },
                    );
                    self.tsch.active = Some(ActiveSlot {
                        handle:  Some(handle),
                        cell:    Some(cell),
                        channel,
                        tx_uid:  Some(eb.uid),
                    });
                    self.radio.start_tx(eb, channel);
                    ctx.request_propagation();
                    return;
                }
            }
        }

        if let Some((handle, cell)) = self.tsch.first_cell_at(ctx.asn, |c| c.is_rx()) {
            let channel = ctx.channel_for(cell.channel_offset);
            self.start_listening(ctx, Some(handle), Some(cell), channel);
            return;
        }

        self.tsch_schedule_next_active(ctx);
    }

    fn start_listening(&mut self, ctx: &mut Ctx, handle: Option<u8>, cell: Option<Cell>, channel: u8) {
        self.tsch.active = Some(ActiveSlot { handle, cell, channel, tx_uid: None });
        self.radio.start_rx(channel);
        ctx.request_propagation();
    }

    fn start_transmitting(
        &mut self,
        ctx:     &mut Ctx,
        handle:  Option<u8>,
        cell:    Option<Cell>,
        channel: u8,
        uid:     u64,
    ) {
        let pending_enabled = ctx.settings.tsch_pending_bit_enabled;
        let Some(frame) = self.tsch.tx_queue.get(uid) else {
            self.tsch_schedule_next_active(ctx);
            return;
        };
        let mut frame = frame.clone();
        if pending_enabled && !frame.is_broadcast() {
            let dst = frame.mac.dst;
            frame.mac.pending_bit = self
                .tsch
                .tx_queue
                .iter()
                .any(|p| p.uid != uid && p.mac.dst == dst);
        }
        self.tsch.tx_queue.set_in_flight(Some(uid));
        self.tsch.active = Some(ActiveSlot { handle, cell, channel, tx_uid: Some(uid) });
        self.radio.start_tx(frame, channel);
        ctx.request_propagation();
    }

    // ── Completion callbacks (from propagation) ───────────────────────────

    /// End of a TX slot.  `ack` holds the receiver's clock offset when the
    /// frame was acknowledged; broadcast frames are never acknowledged.
    pub fn tsch_tx_done(&mut self, ctx: &mut Ctx, ack: Option<f64>) {
        let acked = ack.is_some();
        let active = self.tsch.active.take();
        let sent = match std::mem::take(&mut self.radio.state) {
            crate::RadioState::Tx { packet, .. } => Some(*packet),
            other => {
                self.radio.state = other;
                None
            }
        };
        self.radio.finish(false);
        self.radio.stats.tx += 1;
        self.tsch.tx_queue.set_in_flight(None);
        let (Some(active), Some(sent)) = (active, sent) else {
            self.tsch_schedule_next_active(ctx);
            return;
        };

        let (slot_offset, channel_offset) = match &active.cell {
            Some(c) => (Some(c.slot_offset), Some(c.channel_offset)),
            None => (None, None),
        };

        if sent.is_broadcast() {
            let retries_left = self.tsch.tx_queue.remove(sent.uid).map_or(0, |p| p.mac.retries_left);
            ctx.log(self.id, LogEvent::TschTxDone {
                packet: sent.info(),
                channel: active.channel,
                slot_offset,
                channel_offset,
                is_acked: false,
                retries_left,
            });
            self.tsch_schedule_next_active(ctx);
            return;
        }

        let dst = sent.mac.dst;
        if let (Some(h), Some(c)) = (active.handle, active.cell.as_ref()) {
            if let Some(cell) = self.tsch.cell_mut(h, c) {
                cell.stats.num_tx += 1;
                if acked {
                    cell.stats.num_tx_ack += 1;
                }
            }
        }
        let shared = active.cell.as_ref().is_some_and(|c| c.is_shared());
        let retries_left = self.tsch.tx_queue.get(sent.uid).map_or(0, |p| p.mac.retries_left);
        ctx.log(self.id, LogEvent::TschTxDone {
            packet: sent.info(),
            channel: active.channel,
            slot_offset,
            channel_offset,
            is_acked: acked,
            retries_left,
        });

        self.rpl_on_tx_done(ctx, dst, acked);

        if acked {
            self.tsch.tx_queue.remove(sent.uid);
            if let Some((old_be, new_be)) = self.tsch.set_backoff_exponent(MIN_BE) {
                ctx.log(self.id, LogEvent::TschBeUpdated { old_be, new_be });
            }
            // The ACK carries the receiver's time.
            if let (Some(offset), true) = (ack, self.tsch.clock_source == Some(dst)) {
                self.tsch_resync(ctx, offset);
            }
            if sent.mac.pending_bit && self.tsch.tx_queue.has_frame_for(dst) {
                self.tsch.pending = Some(PendingBit {
                    asn:     ctx.asn + 1,
                    peer:    dst,
                    channel: active.channel,
                    tx:      true,
                });
            }
            self.sixp_on_tx_done(ctx, &sent, true);
        } else if retries_left == 0 {
            if let Some(dropped) = self.tsch.tx_queue.remove(sent.uid) {
                ctx.log(self.id, LogEvent::TschDrop { packet: dropped.info(), reason: DropReason::MaxRetries });
            }
            self.sixp_on_tx_done(ctx, &sent, false);
        } else {
            if shared {
                let be = self.tsch.backoff_exponent.saturating_add(1);
                if let Some((old_be, new_be)) = self.tsch.set_backoff_exponent(be) {
                    ctx.log(self.id, LogEvent::TschBeUpdated { old_be, new_be });
                }
            }
            let delay = if shared { self.tsch.draw_backoff(ctx.rng) } else { 0 };
            if let Some(p) = self.tsch.tx_queue.get_mut(sent.uid) {
                p.mac.retries_left -= 1;
                p.backoff_remaining_delay = delay;
            }
        }

        self.sf_on_tx_done(ctx, dst);
        self.tsch_schedule_next_active(ctx);
    }

    /// End of an RX slot; `frame` is what the propagation step delivered.
    pub fn tsch_rx_done(&mut self, ctx: &mut Ctx, frame: Option<RxFrame>) {
        let active = self.tsch.active.take();
        self.radio.finish(frame.is_some());

        if let Some(frame) = frame {
            if !self.tsch.is_sync {
                if let Payload::Eb { join_metric } = frame.packet.payload {
                    self.tsch_on_eb(ctx, frame.packet.mac.src, join_metric, frame.src_clock_offset_us);
                }
            } else {
                if let Some(active) = &active {
                    if let (Some(h), Some(c)) = (active.handle, active.cell.as_ref()) {
                        if let Some(cell) = self.tsch.cell_mut(h, c) {
                            cell.stats.num_rx += 1;
                        }
                    }
                }
                let src = frame.packet.mac.src;
                if self.tsch.clock_source == Some(src) {
                    self.tsch_resync(ctx, frame.src_clock_offset_us);
                }
                if frame.packet.mac.pending_bit && ctx.settings.tsch_pending_bit_enabled {
                    self.tsch.pending = Some(PendingBit {
                        asn:     ctx.asn + 1,
                        peer:    src,
                        channel: frame.channel,
                        tx:      false,
                    });
                }
                match frame.packet.kind {
                    PacketType::Eb | PacketType::KeepAlive => {}
                    PacketType::SixP => self.sixp_recv(ctx, frame.packet),
                    _ => self.sixlowpan_recv(ctx, frame.packet),
                }
            }
        }
        self.tsch_schedule_next_active(ctx);
    }

    // ── Synchronization ───────────────────────────────────────────────────

    fn eb_eligible(&self) -> bool {
        self.tsch.is_sync && self.secjoin.joined && (self.is_root || self.rpl_preferred_parent().is_some())
    }

    /// RFC 8180 join metric: DAGRank(rank) - 1.
    fn join_metric(&self) -> u16 {
        (self.rpl_rank() / crate::of::MIN_HOP_RANK_INCREASE).saturating_sub(1)
    }

    fn tsch_on_eb(&mut self, ctx: &mut Ctx, src: Eui64, join_metric: u16, clock_offset_us: f64) {
        self.tsch.eb_candidates.insert(src, EbCandidate { join_metric, clock_offset_us });
        if self.tsch.eb_candidates.len() as u32 >= ctx.settings.tsch_num_neighbors_to_wait {
            self.tsch_sync_to_best(ctx);
        } else if !ctx.is_scheduled(self.id, Timer::EbWaitEnd) {
            ctx.schedule_in_secs(self.id, Timer::EbWaitEnd, ctx.settings.tsch_max_eb_delay);
        }
    }

    pub(crate) fn on_eb_wait_end(&mut self, ctx: &mut Ctx) {
        if !self.tsch.is_sync {
            self.tsch_sync_to_best(ctx);
        }
    }

    fn tsch_sync_to_best(&mut self, ctx: &mut Ctx) {
        // Lowest join metric; ties go to the smallest EUI-64.
        let best = self
            .tsch
            .eb_candidates
            .iter()
            .min_by_key(|(eui, c)| (c.join_metric, **eui))
            .map(|(eui, c)| (*eui, c.clock_offset_us));
        if let Some((source, offset)) = best {
            self.tsch_sync(ctx, source, offset);
        }
    }

    /// Synchronize to `source` and bring the upper layers up.
    pub fn tsch_sync(&mut self, ctx: &mut Ctx, source: Eui64, source_offset_us: f64) {
        self.tsch.eb_candidates.clear();
        ctx.cancel(self.id, Timer::EbWaitEnd);
        self.tsch.is_sync = true;
        self.tsch.clock_source = Some(source);
        self.tsch.clock.sync(ctx.asn, source_offset_us);
        ctx.log(self.id, LogEvent::TschSynced { clock_source: source });
        self.tsch_install_minimal(ctx);
        self.tsch_arm_timers(ctx);
        self.sf_on_sync(ctx);
        self.secjoin_start(ctx);
        self.tsch_schedule_next_active(ctx);
    }

    /// Boot the root: always synchronized, never drifting.
    pub(crate) fn tsch_start_root(&mut self, ctx: &mut Ctx) {
        self.tsch.is_sync = true;
        self.tsch_install_minimal(ctx);
        self.sf_on_sync(ctx);
        self.tsch_schedule_next_active(ctx);
    }

    pub(crate) fn tsch_install_minimal(&mut self, ctx: &mut Ctx) {
        if let Err(e) = self.install_minimal_cell(ctx) {
            tracing::warn!(mote = %self.id, error = %e, "minimal cell not installed");
        }
    }

    pub(crate) fn tsch_arm_timers(&self, ctx: &mut Ctx) {
        self.arm_sync_watchdog(ctx);
        self.arm_keep_alive(ctx);
    }

    fn tsch_resync(&mut self, ctx: &mut Ctx, source_offset_us: f64) {
        self.tsch.clock.sync(ctx.asn, source_offset_us);
        self.tsch_arm_timers(ctx);
    }

    /// Follow a new time source (the RPL preferred parent).
    pub(crate) fn tsch_set_clock_source(&mut self, source: Eui64) {
        self.tsch.clock_source = Some(source);
    }

    fn arm_sync_watchdog(&self, ctx: &mut Ctx) {
        if !self.is_root {
            ctx.schedule_in(self.id, Timer::SyncWatchdog, DESYNC_TIMEOUT_SLOTS);
        }
    }

    fn arm_keep_alive(&self, ctx: &mut Ctx) {
        let interval = ctx.settings.tsch_keep_alive_interval;
        if !self.is_root && interval > 0.0 {
            ctx.schedule_in_secs(self.id, Timer::KeepAlive, interval);
        }
    }

    pub(crate) fn on_keep_alive(&mut self, ctx: &mut Ctx) {
        let Some(source) = self.tsch.clock_source.filter(|_| self.tsch.is_sync) else {
            return;
        };
        let queued = self.tsch.tx_queue.iter().any(|p| p.kind == PacketType::KeepAlive);
        if !queued {
            let mut ka = Packet::mac_only(ctx.new_uid(), PacketType::KeepAlive, self.eui64, source, Payload::KeepAlive);
            ka.mac.priority = true;
            self.tsch_enqueue(ctx, ka);
        }
        self.arm_keep_alive(ctx);
    }

    pub(crate) fn on_sync_watchdog(&mut self, ctx: &mut Ctx) {
        if self.tsch.is_sync && !self.is_root {
            tracing::debug!(mote = %self.id, asn = %ctx.asn, "time source silent; desynchronizing");
            self.tsch_desync(ctx);
        }
    }

    /// Lose synchronization: tear the stack down and scan for EBs again.
    pub fn tsch_desync(&mut self, ctx: &mut Ctx) {
        if self.is_root {
            return;
        }
        self.tsch.is_sync = false;
        self.tsch.clock_source = None;
        self.tsch.pending = None;
        self.tsch.active = None;
        for dropped in self.tsch.tx_queue.clear() {
            ctx.log(self.id, LogEvent::TschDrop { packet: dropped.info(), reason: DropReason::NotJoined });
        }
        self.tsch.backoff_exponent = MIN_BE;
        ctx.log(self.id, LogEvent::TschDesynced {});
        for timer in [Timer::SyncWatchdog, Timer::KeepAlive, Timer::EbWaitEnd] {
            ctx.cancel(self.id, timer);
        }
        let handles: Vec<u8> = self.tsch.slotframes.keys().copied().collect();
        for handle in handles {
            self.tsch_delete_slotframe(ctx, handle);
        }

        self.secjoin_reset(ctx);
        self.rpl_reset(ctx);
        self.sixp_reset(ctx);
        self.sf_reset(ctx);
        self.sixlowpan_reset(ctx);
        self.app_stop(ctx);

        self.tsch_schedule_next_active(ctx);
    }

    /// The transmission a propagation step needs from this mote, if any.
    pub fn tsch_active_slot(&self) -> Option<&ActiveSlot> {
        self.tsch.active.as_ref()
    }

    /// Clock offset from true time at the current ASN.
    pub fn clock_offset_us(&self, asn: Asn, settings: &Settings) -> f64 {
        self.tsch.clock.offset_us(asn, &settings.slot_clock())
    }
}

fn delete_cell_event(handle: u8, cell: &Cell) -> LogEvent {
    LogEvent::TschDeleteCell {
        handle,
        slot_offset:    cell.slot_offset,
        channel_offset: cell.channel_offset,
        neighbor:       cell.mac_addr,
        cell_options:   cell.options.names(),
        link_type:      cell.link_type.as_str().to_string(),
    }
}
