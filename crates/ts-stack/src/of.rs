//! RPL objective functions and the neighbour (parent candidate) set.
//!
//! The [`ParentSet`] owns the neighbour records; an [`ObjectiveFunction`]
//! judges them.  Parent selection itself is shared:
//!
//! * with no parent, the best acceptable candidate is taken;
//! * an unacceptable parent is evicted and the mote is left with no parent
//!   (rank infinite) until the next DIO;
//! * otherwise the OF decides whether the best candidate is worth a switch.

use std::collections::BTreeMap;
use std::fmt;

use ts_core::{Eui64, RplOf, Settings};

pub const MIN_HOP_RANK_INCREASE: u16 = 256;
pub const ROOT_RANK: u16 = MIN_HOP_RANK_INCREASE;
pub const INFINITE_RANK: u16 = u16::MAX;

/// ETX assumed before enough transmissions were made (numTx / numTxAck).
pub const DEFAULT_NUM_TX: u32 = 4;
pub const DEFAULT_NUM_TX_ACK: u32 = 3;
/// Transmissions after which the measured ETX replaces the default.
pub const ETX_MIN_NUM_TX: u32 = 100;
pub const UPPER_LIMIT_OF_ACCEPTABLE_ETX: f64 = 3.0;
pub const MAX_NUM_OF_CONSECUTIVE_FAILURES_WITHOUT_SUCCESS: u32 = 10;
pub const ACCEPTABLE_LOWEST_PDR: f64 = 0.5;

/// What this mote knows about a neighbour that sent it a DIO.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighbor {
    pub eui64:                Eui64,
    /// Rank advertised in the neighbour's last DIO.
    pub rank:                 u16,
    pub num_tx:               u32,
    pub num_tx_ack:           u32,
    pub consecutive_failures: u32,
}

impl Neighbor {
    pub fn new(eui64: Eui64, rank: u16) -> Self {
        Neighbor { eui64, rank, num_tx: 0, num_tx_ack: 0, consecutive_failures: 0 }
    }

    /// Measured link ETX, if any frame was acknowledged.
    pub fn etx(&self) -> Option<f64> {
        (self.num_tx_ack > 0).then(|| f64::from(self.num_tx) / f64::from(self.num_tx_ack))
    }

    /// Smoothed PDR estimate, starting from 3 / 4.
    pub fn pdr_estimate(&self) -> f64 {
        f64::from(self.num_tx_ack + DEFAULT_NUM_TX_ACK) / f64::from(self.num_tx + DEFAULT_NUM_TX)
    }
}

pub trait ObjectiveFunction: Send + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Rank added on top of the neighbour's advertised rank.
    fn rank_increase(&self, n: &Neighbor) -> u16;

    /// Whether `n` may be (or stay) the preferred parent.
    fn is_acceptable(&self, n: &Neighbor) -> bool;

    /// Ordering key among candidates; lower is better.
    fn preference(&self, n: &Neighbor) -> f64;

    /// Whether to move from `parent` to `best`.
    fn should_switch(&self, parent: &Neighbor, best: &Neighbor, own_rank: u16) -> bool;

    /// Rank this mote would have with `n` as parent.
    fn rank_through(&self, n: &Neighbor) -> u16 {
        n.rank.saturating_add(self.rank_increase(n))
    }
}

/// Build the configured objective function.
pub fn from_settings(settings: &Settings) -> Box<dyn ObjectiveFunction> {
    match settings.rpl_of {
        RplOf::Of0 => Box::new(Of0 { switch_threshold: settings.rpl_parent_switch_rank_threshold }),
        RplOf::OfBestLinkPdr => {
            Box::new(OfBestLinkPdr { switch_margin: settings.rpl_of_best_link_pdr_switch_margin })
        }
    }
}

// ── OF0 ───────────────────────────────────────────────────────────────────────

/// OF0 with the RFC 8180 step: `(3·ETX − 2) · MinHopRankIncrease`.
#[derive(Debug)]
pub struct Of0 {
    pub switch_threshold: u16,
}

impl Of0 {
    fn counts(n: &Neighbor) -> (u32, u32) {
        if n.num_tx >= ETX_MIN_NUM_TX && n.num_tx_ack > 0 {
            (n.num_tx, n.num_tx_ack)
        } else {
            (DEFAULT_NUM_TX, DEFAULT_NUM_TX_ACK)
        }
    }
}

impl ObjectiveFunction for Of0 {
    fn name(&self) -> &'static str {
        "OF0"
    }

    fn rank_increase(&self, n: &Neighbor) -> u16 {
        let (tx, ack) = Self::counts(n);
        let step = (3 * u64::from(tx)).saturating_sub(2 * u64::from(ack)) * u64::from(MIN_HOP_RANK_INCREASE)
            / u64::from(ack);
        u16::try_from(step).unwrap_or(INFINITE_RANK)
    }

    fn is_acceptable(&self, n: &Neighbor) -> bool {
        if n.consecutive_failures >= MAX_NUM_OF_CONSECUTIVE_FAILURES_WITHOUT_SUCCESS {
            return false;
        }
        if n.num_tx >= ETX_MIN_NUM_TX {
            return n.etx().is_some_and(|etx| etx <= UPPER_LIMIT_OF_ACCEPTABLE_ETX);
        }
        true
    }

    fn preference(&self, n: &Neighbor) -> f64 {
        f64::from(self.rank_through(n))
    }

    fn should_switch(&self, parent: &Neighbor, best: &Neighbor, _own_rank: u16) -> bool {
        u32::from(self.rank_through(best)) + u32::from(self.switch_threshold)
            <= u32::from(self.rank_through(parent))
    }
}

// ── OFBestLinkPDR ─────────────────────────────────────────────────────────────

/// Prefers the neighbour with the best link PDR.
#[derive(Debug)]
pub struct OfBestLinkPdr {
    pub switch_margin: f64,
}

impl ObjectiveFunction for OfBestLinkPdr {
    fn name(&self) -> &'static str {
        "OFBestLinkPDR"
    }

    fn rank_increase(&self, n: &Neighbor) -> u16 {
        let etx = 1.0 / n.pdr_estimate();
        let step = ((3.0 * etx - 2.0) * f64::from(MIN_HOP_RANK_INCREASE)).round();
        if step >= f64::from(INFINITE_RANK) { INFINITE_RANK } else { step.max(0.0) as u16 }
    }

    fn is_acceptable(&self, n: &Neighbor) -> bool {
        n.pdr_estimate() >= ACCEPTABLE_LOWEST_PDR
    }

    fn preference(&self, n: &Neighbor) -> f64 {
        -n.pdr_estimate()
    }

    fn should_switch(&self, parent: &Neighbor, best: &Neighbor, own_rank: u16) -> bool {
        best.pdr_estimate() > parent.pdr_estimate() + self.switch_margin && best.rank < own_rank
    }
}

// ── ParentSet ─────────────────────────────────────────────────────────────────

/// Outcome of a parent (re)selection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParentChange {
    pub old_parent: Option<Eui64>,
    pub new_parent: Option<Eui64>,
    pub old_rank:   Option<u16>,
    pub new_rank:   Option<u16>,
}

#[derive(Debug)]
pub struct ParentSet {
    of:        Box<dyn ObjectiveFunction>,
    neighbors: BTreeMap<Eui64, Neighbor>,
    parent:    Option<Eui64>,
    /// `None` is infinite.
    rank:      Option<u16>,
}

impl ParentSet {
    pub fn new(of: Box<dyn ObjectiveFunction>) -> Self {
        ParentSet { of, neighbors: BTreeMap::new(), parent: None, rank: None }
    }

    pub fn of_name(&self) -> &'static str {
        self.of.name()
    }

    pub fn parent(&self) -> Option<Eui64> {
        self.parent
    }

    pub fn rank(&self) -> Option<u16> {
        self.rank
    }

    pub fn neighbor(&self, eui: Eui64) -> Option<&Neighbor> {
        self.neighbors.get(&eui)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }

    pub fn contains(&self, eui: Eui64) -> bool {
        self.neighbors.contains_key(&eui)
    }

    /// Record a DIO.  An infinite rank removes the sender.
    pub fn update_neighbor(&mut self, eui: Eui64, rank: u16) {
        if rank == INFINITE_RANK {
            self.neighbors.remove(&eui);
            return;
        }
        self.neighbors
            .entry(eui)
            .and_modify(|n| n.rank = rank)
            .or_insert_with(|| Neighbor::new(eui, rank));
    }

    pub fn remove_neighbor(&mut self, eui: Eui64) -> Option<Neighbor> {
        self.neighbors.remove(&eui)
    }

    /// Account a unicast transmission attempt toward `eui`.
    pub fn record_tx(&mut self, eui: Eui64, acked: bool) {
        if let Some(n) = self.neighbors.get_mut(&eui) {
            n.num_tx = n.num_tx.saturating_add(1);
            if acked {
                n.num_tx_ack = n.num_tx_ack.saturating_add(1);
                n.consecutive_failures = 0;
            } else {
                n.consecutive_failures = n.consecutive_failures.saturating_add(1);
            }
        }
    }

    /// Install `eui` as parent without consulting the OF.
    pub fn force_parent(&mut self, neighbor: Neighbor) {
        let eui = neighbor.eui64;
        self.neighbors.insert(eui, neighbor);
        self.parent = Some(eui);
        self.rank = self.neighbors.get(&eui).map(|n| self.of.rank_through(n));
    }

    pub fn rank_through(&self, eui: Eui64) -> Option<u16> {
        self.neighbors.get(&eui).map(|n| self.of.rank_through(n))
    }

    fn best_candidate(&self) -> Option<&Neighbor> {
        self.neighbors
            .values()
            .filter(|n| self.of.is_acceptable(n) && self.of.rank_through(n) < INFINITE_RANK)
            .min_by(|a, b| {
                self.of
                    .preference(a)
                    .total_cmp(&self.of.preference(b))
                    .then(a.eui64.cmp(&b.eui64))
            })
    }

    /// Drop the parent if the OF no longer accepts it.
    pub fn evict_if_unacceptable(&mut self) -> Option<ParentChange> {
        let parent = self.parent?;
        let ok = self.neighbors.get(&parent).is_some_and(|n| self.of.is_acceptable(n));
        if ok {
            return None;
        }
        self.neighbors.remove(&parent);
        self.set(None)
    }

    /// Re-run parent selection.
    pub fn select(&mut self) -> Option<ParentChange> {
        let current = self.parent.and_then(|p| self.neighbors.get(&p));
        let best = self.best_candidate();
        let next = match (current, best) {
            (None, best) => best.map(|b| b.eui64),
            (Some(p), _) if !self.of.is_acceptable(p) => None,
            (Some(p), Some(b)) if b.eui64 != p.eui64 => {
                let own = self.rank.unwrap_or(INFINITE_RANK);
                if self.of.should_switch(p, b, own) { Some(b.eui64) } else { Some(p.eui64) }
            }
            (Some(p), _) => Some(p.eui64),
        };
        self.set(next)
    }

    fn set(&mut self, parent: Option<Eui64>) -> Option<ParentChange> {
        let old_parent = self.parent;
        let old_rank = self.rank;
        self.parent = parent;
        self.rank = parent.and_then(|p| self.rank_through(p));
        (old_parent != self.parent || old_rank != self.rank).then_some(ParentChange {
            old_parent,
            new_parent: self.parent,
            old_rank,
            new_rank: self.rank,
        })
    }

    pub fn clear(&mut self) {
        self.neighbors.clear();
        self.parent = None;
        self.rank = None;
    }
}
