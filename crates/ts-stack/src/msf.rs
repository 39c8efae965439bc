//! 6TiSCH Minimal Scheduling Function (RFC 9033).
//!
//! * Autonomous cells live in their own slotframe (handle 1): every mote
//!   listens at a cell derived from its own EUI-64, and reaches a neighbour
//!   through a `{TX, SHARED}` cell at that neighbour's hash.  The cell to the
//!   parent is permanent; cells to other neighbours exist only while frames
//!   for them are queued.
//! * Negotiated cells to the parent live in the minimal slotframe and are
//!   sized from their measured utilization at every housekeeping round.

use std::collections::BTreeSet;

use ts_core::{Eui64, LogEvent};

use crate::sixp::{ReturnCode, SixpCell, SixpCommand, SixpOutcome, SixpRequest};
use crate::slotframe::{Cell, CellOptions, LinkType};
use crate::tsch::MINIMAL_HANDLE;
use crate::{Ctx, Mote, Timer};

pub const SFID_MSF: u8 = 0;
pub const AUTONOMOUS_HANDLE: u8 = 1;
/// Candidates offered in an ADD or RELOCATE request.
pub const NUM_CANDIDATES: u32 = 5;
/// Upper bound of the random wait before retrying a failed ADD.
pub const MAX_RETRY_BACKOFF_SLOTFRAMES: u64 = 16;

/// SAX hash of an EUI-64 (RFC 9033 §3).
pub fn sax(eui: Eui64) -> u32 {
    const L_BIT: u32 = 5;
    const R_BIT: u32 = 2;
    let mut h: u32 = 0;
    for byte in eui.0 {
        h ^= (h << L_BIT).wrapping_add(h >> R_BIT).wrapping_add(u32::from(byte));
    }
    h & 0xffff
}

/// `(slot_offset, channel_offset)` of the autonomous cell of `eui`.
pub fn autonomous_cell_position(eui: Eui64, slotframe_length: u32, num_channels: u8) -> Option<(u32, u8)> {
    if slotframe_length < 2 || num_channels == 0 {
        return None;
    }
    let h = sax(eui);
    Some((1 + h % (slotframe_length - 1), (h % u32::from(num_channels)) as u8))
}

#[derive(Debug, Default)]
pub struct Msf {
    pub num_cells_elapsed: u32,
    pub num_cells_used:    u32,
    /// Neighbours with a temporary autonomous TX cell.
    on_demand:             BTreeSet<Eui64>,
    /// ADD in flight or waiting for a retry: peer and cell count.
    pending_add:           Option<(Eui64, u32)>,
}

impl Msf {
    pub fn has_on_demand_cell(&self, peer: Eui64) -> bool {
        self.on_demand.contains(&peer)
    }
}

impl Mote {
    fn msf_mut(&mut self) -> Option<&mut Msf> {
        match &mut self.sf {
            crate::sf::Sf::Msf(m) => Some(m),
            crate::sf::Sf::None => None,
        }
    }

    fn autonomous_cell(&self, ctx: &Ctx, eui: Eui64, options: CellOptions, mac: Option<Eui64>) -> Option<Cell> {
        let channels = ctx.settings.tsch_hopping_sequence.len().min(usize::from(u8::MAX)) as u8;
        let (slot, channel) = autonomous_cell_position(eui, ctx.settings.tsch_slotframe_length, channels)?;
        Some(Cell::new(slot, channel, options, mac, LinkType::Normal))
    }

    fn autonomous_tx_cell(&self, ctx: &Ctx, peer: Eui64) -> Option<Cell> {
        self.autonomous_cell(ctx, peer, CellOptions::TX | CellOptions::SHARED, Some(peer))
    }

    pub(crate) fn msf_start(&mut self, ctx: &mut Ctx) {
        if self.tsch.slotframe(AUTONOMOUS_HANDLE).is_none() {
            let length = ctx.settings.tsch_slotframe_length;
            if let Err(e) = self.tsch_add_slotframe(ctx, AUTONOMOUS_HANDLE, length) {
                tracing::warn!(mote = %self.id, error = %e, "autonomous slotframe not added");
                return;
            }
        }
        if let Some(rx) = self.autonomous_cell(ctx, self.eui64, CellOptions::RX, None) {
            if let Err(e) = self.tsch_add_cell(ctx, AUTONOMOUS_HANDLE, rx) {
                tracing::debug!(mote = %self.id, error = %e, "autonomous RX cell not added");
            }
        }
        ctx.schedule_in_secs(self.id, Timer::MsfHousekeeping, ctx.settings.msf_housekeeping_period);
    }

    pub(crate) fn msf_stop(&mut self, ctx: &mut Ctx) {
        ctx.cancel(self.id, Timer::MsfHousekeeping);
        ctx.cancel(self.id, Timer::MsfRetry);
        if let Some(msf) = self.msf_mut() {
            *msf = Msf::default();
        }
    }

    /// Negotiated TX cells toward `peer`.
    pub fn msf_negotiated_tx_cells(&self, peer: Eui64) -> Vec<Cell> {
        self.tsch
            .slotframe(MINIMAL_HANDLE)
            .map(|sf| sf.cells_with(Some(peer)).filter(|c| c.is_dedicated_tx()).cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn msf_count_slot(&mut self, ctx: &mut Ctx, used: Option<(u8, &Cell)>) {
        let Some(parent) = self.rpl_preferred_parent() else {
            return;
        };
        let Some(sf) = self.tsch.slotframe(MINIMAL_HANDLE) else {
            return;
        };
        let elapsed = sf
            .cells_at(ctx.asn.slot_offset(sf.length))
            .iter()
            .filter(|c| c.mac_addr == Some(parent) && c.is_dedicated_tx())
            .count() as u32;
        let used = used.is_some_and(|(h, c)| {
            h == MINIMAL_HANDLE && c.mac_addr == Some(parent) && c.is_dedicated_tx()
        });
        if let Some(msf) = self.msf_mut() {
            msf.num_cells_elapsed += elapsed;
            if used {
                msf.num_cells_used += 1;
            }
        }
    }

    pub(crate) fn msf_on_frame_enqueued(&mut self, ctx: &mut Ctx, dst: Eui64) {
        if Some(dst) == self.rpl_preferred_parent() || self.tsch.has_tx_cell_to(dst) {
            return;
        }
        let Some(cell) = self.autonomous_tx_cell(ctx, dst) else {
            return;
        };
        match self.tsch_add_cell(ctx, AUTONOMOUS_HANDLE, cell) {
            Ok(()) => {
                if let Some(msf) = self.msf_mut() {
                    msf.on_demand.insert(dst);
                }
            }
            Err(e) => tracing::debug!(mote = %self.id, error = %e, "on-demand autonomous cell not added"),
        }
    }

    pub(crate) fn msf_on_tx_done(&mut self, ctx: &mut Ctx, dst: Eui64) {
        let on_demand = self.sf.msf().is_some_and(|m| m.has_on_demand_cell(dst));
        if !on_demand || self.tsch.tx_queue.has_frame_for(dst) {
            return;
        }
        if let Some(cell) = self.autonomous_tx_cell(ctx, dst) {
            self.tsch_delete_cell(ctx, AUTONOMOUS_HANDLE, &cell);
        }
        if let Some(msf) = self.msf_mut() {
            msf.on_demand.remove(&dst);
        }
    }

    /// Make the autonomous TX cell toward `parent` permanent.
    pub(crate) fn msf_add_parent_cell(&mut self, ctx: &mut Ctx, parent: Eui64) {
        let had_on_demand = self.msf_mut().is_some_and(|m| m.on_demand.remove(&parent));
        if had_on_demand {
            return;
        }
        if let Some(cell) = self.autonomous_tx_cell(ctx, parent) {
            if let Err(e) = self.tsch_add_cell(ctx, AUTONOMOUS_HANDLE, cell) {
                tracing::debug!(mote = %self.id, error = %e, "parent autonomous cell not added");
            }
        }
    }

    pub(crate) fn msf_on_parent_change(&mut self, ctx: &mut Ctx, old: Option<Eui64>, new: Option<Eui64>) {
        let old_count = old.map_or(0, |o| self.msf_negotiated_tx_cells(o).len() as u32);

        if let Some(o) = old {
            if self.tsch.tx_queue.has_frame_for(o) {
                if let Some(msf) = self.msf_mut() {
                    msf.on_demand.insert(o);
                }
            } else if let Some(cell) = self.autonomous_tx_cell(ctx, o) {
                self.tsch_delete_cell(ctx, AUTONOMOUS_HANDLE, &cell);
            }
        }

        if let Some(n) = new {
            self.msf_add_parent_cell(ctx, n);
            self.msf_add_cells(ctx, n, old_count.max(1));
        }

        if let Some(o) = old {
            if old_count > 0 {
                self.sixp_send_request(ctx, o, SixpRequest::new(SixpCommand::Clear, CellOptions::empty()));
            }
        }

        if let Some(msf) = self.msf_mut() {
            msf.num_cells_elapsed = 0;
            msf.num_cells_used = 0;
        }
    }

    /// Up to `num` random free slots (never slot 0) with random channels.
    fn msf_candidates(&self, ctx: &mut Ctx, num: u32) -> Vec<SixpCell> {
        let mut free: Vec<u32> = self
            .tsch
            .get_available_slots(MINIMAL_HANDLE)
            .into_iter()
            .filter(|&s| s != 0 && self.tsch.is_slot_free(s))
            .collect();
        let channels = ctx.settings.tsch_hopping_sequence.len().clamp(1, usize::from(u8::MAX)) as u8;
        let mut out = Vec::new();
        while (out.len() as u32) < num && !free.is_empty() {
            let i = ctx.rng.gen_range(0..free.len());
            let slot_offset = free.swap_remove(i);
            out.push(SixpCell { slot_offset, channel_offset: ctx.rng.gen_range(0..channels) });
        }
        out
    }

    fn msf_add_cells(&mut self, ctx: &mut Ctx, peer: Eui64, num: u32) {
        let candidates = self.msf_candidates(ctx, NUM_CANDIDATES.max(num));
        if candidates.is_empty() {
            ctx.log(self.id, LogEvent::MsfErrorScheduleFull { neighbor: peer });
            return;
        }
        let mut request = SixpRequest::new(SixpCommand::Add, CellOptions::TX);
        request.num_cells = num;
        request.cell_list = candidates;
        if let Some(msf) = self.msf_mut() {
            msf.pending_add = Some((peer, num));
        }
        if !self.sixp_send_request(ctx, peer, request) {
            self.msf_schedule_retry(ctx);
        }
    }

    fn msf_delete_cell(&mut self, ctx: &mut Ctx, peer: Eui64, cell: &Cell) {
        let mut request = SixpRequest::new(SixpCommand::Delete, CellOptions::TX);
        request.num_cells = 1;
        request.cell_list = vec![SixpCell::from(cell)];
        self.sixp_send_request(ctx, peer, request);
    }

    fn msf_relocate_cell(&mut self, ctx: &mut Ctx, peer: Eui64, cell: &Cell) {
        let candidates = self.msf_candidates(ctx, NUM_CANDIDATES);
        if candidates.is_empty() {
            ctx.log(self.id, LogEvent::MsfErrorScheduleFull { neighbor: peer });
            return;
        }
        let mut request = SixpRequest::new(SixpCommand::Relocate, CellOptions::TX);
        request.num_cells = 1;
        request.cell_list = vec![SixpCell::from(cell)];
        request.relocation_cell_list = candidates;
        self.sixp_send_request(ctx, peer, request);
    }

    fn msf_schedule_retry(&mut self, ctx: &mut Ctx) {
        let slotframes = ctx.rng.gen_range(1..=MAX_RETRY_BACKOFF_SLOTFRAMES);
        let slots = slotframes * u64::from(ctx.settings.tsch_slotframe_length);
        ctx.schedule_in(self.id, Timer::MsfRetry, slots);
    }

    pub(crate) fn on_msf_retry(&mut self, ctx: &mut Ctx) {
        let Some((peer, num)) = self.msf_mut().and_then(|m| m.pending_add.take()) else {
            return;
        };
        if Some(peer) == self.rpl_preferred_parent() {
            self.msf_add_cells(ctx, peer, num);
        }
    }

    pub(crate) fn on_msf_housekeeping(&mut self, ctx: &mut Ctx) {
        ctx.schedule_in_secs(self.id, Timer::MsfHousekeeping, ctx.settings.msf_housekeeping_period);
        let Some(parent) = self.rpl_preferred_parent() else {
            return;
        };
        if self.sixp.is_busy_with(parent) {
            return;
        }
        let Some((elapsed, used)) = self.sf.msf().map(|m| (m.num_cells_elapsed, m.num_cells_used)) else {
            return;
        };
        ctx.log(self.id, LogEvent::MsfTxCellUtilization {
            neighbor:          parent,
            num_cells_elapsed: elapsed,
            num_cells_used:    used,
        });
        if let Some(msf) = self.msf_mut() {
            msf.num_cells_elapsed = 0;
            msf.num_cells_used = 0;
        }

        let tx_cells = self.msf_negotiated_tx_cells(parent);
        if tx_cells.is_empty() {
            self.msf_add_cells(ctx, parent, 1);
            return;
        }
        let settings = ctx.settings;
        if elapsed > 0 {
            let ratio = f64::from(used) / f64::from(elapsed);
            if ratio > settings.msf_lim_num_cells_used_high {
                self.msf_add_cells(ctx, parent, 1);
                return;
            }
            if ratio < settings.msf_lim_num_cells_used_low && tx_cells.len() > 1 {
                if let Some(cell) = tx_cells.last() {
                    self.msf_delete_cell(ctx, parent, cell);
                }
                return;
            }
        }
        let bad = tx_cells
            .iter()
            .find(|c| {
                c.stats.num_tx >= settings.msf_min_num_tx
                    && c.pdr().is_some_and(|p| p < settings.msf_relocate_pdr_thres)
            });
        if let Some(cell) = bad {
            let cell = cell.clone();
            self.msf_relocate_cell(ctx, parent, &cell);
        }
    }

    pub(crate) fn msf_on_sixp_result(&mut self, ctx: &mut Ctx, peer: Eui64, cmd: SixpCommand, outcome: SixpOutcome) {
        match outcome {
            SixpOutcome::Success { .. } => {
                if cmd == SixpCommand::Add {
                    if let Some(msf) = self.msf_mut() {
                        msf.pending_add = None;
                    }
                }
            }
            SixpOutcome::Failure(ReturnCode::ErrSeqnum) => {
                self.sixp_send_request(ctx, peer, SixpRequest::new(SixpCommand::Clear, CellOptions::empty()));
            }
            SixpOutcome::Failure(rc) if rc.is_retryable() && cmd == SixpCommand::Add => {
                self.msf_schedule_retry(ctx);
            }
            SixpOutcome::Timeout if cmd == SixpCommand::Add => {
                self.msf_schedule_retry(ctx);
            }
            _ => {
                if cmd == SixpCommand::Add {
                    if let Some(msf) = self.msf_mut() {
                        msf.pending_add = None;
                    }
                }
            }
        }
    }
}
