//! Cells and slotframes.

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;
use ts_core::Eui64;

use crate::{StackError, StackResult};

// ── CellOptions ───────────────────────────────────────────────────────────────

bitflags! {
    /// Subset of `{TX, RX, SHARED}`.
    #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct CellOptions: u8 {
        const TX     = 0b001;
        const RX     = 0b010;
        const SHARED = 0b100;
    }
}

impl CellOptions {
    /// The options the peer of a negotiated cell installs: TX and RX swap.
    pub fn reversed(self) -> CellOptions {
        let mut out = self & Self::SHARED;
        out.set(Self::RX, self.contains(Self::TX));
        out.set(Self::TX, self.contains(Self::RX));
        out
    }

    pub fn names(self) -> Vec<String> {
        self.iter_names().map(|(n, _)| n.to_string()).collect()
    }
}

impl fmt::Debug for CellOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join("|"))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LinkType {
    Advertising,
    AdvertisingOnly,
    Normal,
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Advertising => "ADVERTISING",
            LinkType::AdvertisingOnly => "ADVERTISING_ONLY",
            LinkType::Normal => "NORMAL",
        }
    }
}

// ── Cell ──────────────────────────────────────────────────────────────────────

/// Per-cell transmission counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CellStats {
    pub num_tx:     u32,
    pub num_tx_ack: u32,
    pub num_rx:     u32,
}

#[derive(Clone, Debug)]
pub struct Cell {
    pub slot_offset:    u32,
    pub channel_offset: u8,
    pub options:        CellOptions,
    /// `None` for cells usable with any neighbour (broadcast / minimal).
    pub mac_addr:       Option<Eui64>,
    pub link_type:      LinkType,
    pub stats:          CellStats,
}

impl Cell {
    pub fn new(
        slot_offset:    u32,
        channel_offset: u8,
        options:        CellOptions,
        mac_addr:       Option<Eui64>,
        link_type:      LinkType,
    ) -> Self {
        Cell { slot_offset, channel_offset, options, mac_addr, link_type, stats: CellStats::default() }
    }

    #[inline]
    pub fn is_tx(&self) -> bool {
        self.options.contains(CellOptions::TX)
    }

    #[inline]
    pub fn is_rx(&self) -> bool {
        self.options.contains(CellOptions::RX)
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.options.contains(CellOptions::SHARED)
    }

    /// Dedicated: TX and not shared.
    #[inline]
    pub fn is_dedicated_tx(&self) -> bool {
        self.is_tx() && !self.is_shared()
    }

    /// Fraction of acknowledged transmissions, `None` before the first TX.
    pub fn pdr(&self) -> Option<f64> {
        (self.stats.num_tx > 0).then(|| self.stats.num_tx_ack as f64 / self.stats.num_tx as f64)
    }
}

/// Cells are equal when their five defining fields are; counters are ignored.
impl PartialEq for Cell {
    fn eq(&self, other: &Cell) -> bool {
        self.slot_offset == other.slot_offset
            && self.channel_offset == other.channel_offset
            && self.options == other.options
            && self.mac_addr == other.mac_addr
            && self.link_type == other.link_type
    }
}

impl Eq for Cell {}

// ── Slotframe ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Slotframe {
    pub handle: u8,
    pub length: u32,
    cells:      BTreeMap<u32, Vec<Cell>>,
}

impl Slotframe {
    pub fn new(handle: u8, length: u32) -> Self {
        Slotframe { handle, length, cells: BTreeMap::new() }
    }

    /// Add a cell.  Two cells at the same `(slot, channel)` toward the same
    /// neighbour must not overlap in TX/RX.
    pub fn add_cell(&mut self, cell: Cell) -> StackResult<()> {
        let slot = self.cells.entry(cell.slot_offset).or_default();
        let txrx = CellOptions::TX | CellOptions::RX;
        let clash = slot.iter().any(|c| {
            c.channel_offset == cell.channel_offset
                && c.mac_addr == cell.mac_addr
                && (c == &cell || (c.options & cell.options).intersects(txrx))
        });
        if clash {
            return Err(StackError::CellExists {
                handle:         self.handle,
                slot_offset:    cell.slot_offset,
                channel_offset: cell.channel_offset,
            });
        }
        slot.push(cell);
        Ok(())
    }

    /// Remove a cell equal to `cell`.  Returns the removed cell.
    pub fn delete_cell(&mut self, cell: &Cell) -> Option<Cell> {
        let slot = self.cells.get_mut(&cell.slot_offset)?;
        let i = slot.iter().position(|c| c == cell)?;
        let removed = slot.remove(i);
        if slot.is_empty() {
            self.cells.remove(&cell.slot_offset);
        }
        Some(removed)
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values().flatten()
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.values_mut().flatten()
    }

    pub fn cells_at(&self, slot_offset: u32) -> &[Cell] {
        self.cells.get(&slot_offset).map_or(&[], |v| v.as_slice())
    }

    pub fn find_mut(&mut self, cell: &Cell) -> Option<&mut Cell> {
        self.cells.get_mut(&cell.slot_offset)?.iter_mut().find(|c| *c == cell)
    }

    /// Cells toward `mac_addr` (`None` selects the neighbour-less cells).
    pub fn cells_with(&self, mac_addr: Option<Eui64>) -> impl Iterator<Item = &Cell> {
        self.cells().filter(move |c| c.mac_addr == mac_addr)
    }

    /// Slot offsets without any cell.
    pub fn available_slots(&self) -> Vec<u32> {
        (0..self.length).filter(|s| !self.cells.contains_key(s)).collect()
    }

    pub fn is_slot_free(&self, slot_offset: u32) -> bool {
        !self.cells.contains_key(&slot_offset)
    }

    pub fn num_cells(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// Slots until the next cell strictly after `slot_offset`, wrapping.
    pub fn slots_to_next_cell(&self, slot_offset: u32) -> Option<u64> {
        if self.cells.is_empty() {
            return None;
        }
        let after = self.cells.range(slot_offset + 1..).next().map(|(s, _)| *s);
        let next = after.or_else(|| self.cells.keys().next().copied())?;
        let delta = if next > slot_offset { next - slot_offset } else { next + self.length - slot_offset };
        Some(delta as u64)
    }
}
