//! RPL in non-storing mode.
//!
//! DIOs are multicast on Trickle; a DIS solicits them.  Non-root motes pick
//! a preferred parent through the objective function and report it to the
//! root in periodic DAOs.  The root keeps the resulting child → parent
//! table and builds source routes from it.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv6Addr;

use ts_core::{ALL_RPL_NODES, Eui64, LogEvent};

use crate::of::{self, INFINITE_RANK, Neighbor, ParentChange, ParentSet, ROOT_RANK};
use crate::packet::{DAO_LENGTH, DIO_LENGTH, DIS_LENGTH, NetHeader};
use crate::trickle::{TrickleInterval, TrickleTimer};
use crate::{Ctx, Mote, Packet, PacketType, Payload, Timer};

pub const DEFAULT_DIS_INTERVAL_S: f64 = 60.0;
/// Delay before the first DAO after a parent change.
pub const DAO_AFTER_PARENT_CHANGE_S: f64 = 1.0;
pub const DAO_JITTER_MIN: f64 = 0.9;
pub const DAO_JITTER_MAX: f64 = 1.1;

/// Source route from `root` to `target`: every hop after the root, in
/// forward order, ending with `target`.  `None` for orphans and cycles.
pub fn compute_source_route(
    parent_of: &BTreeMap<Ipv6Addr, Ipv6Addr>,
    root:      Ipv6Addr,
    target:    Ipv6Addr,
) -> Option<Vec<Ipv6Addr>> {
    let mut route = Vec::new();
    let mut visited = BTreeSet::new();
    let mut hop = target;
    while hop != root {
        if !visited.insert(hop) {
            return None;
        }
        route.push(hop);
        hop = *parent_of.get(&hop)?;
    }
    route.reverse();
    Some(route)
}

#[derive(Debug)]
pub struct Rpl {
    pub parents:      ParentSet,
    pub trickle:      TrickleTimer,
    pub dodag_id:     Option<Ipv6Addr>,
    pub version:      u8,
    /// RPL runs only once the mote has joined.
    pub started:      bool,
    dis_sent:         u32,
    /// Root only: child → parent, from DAOs.
    pub parent_child: BTreeMap<Ipv6Addr, Ipv6Addr>,
}

impl Rpl {
    pub fn new(settings: &ts_core::Settings) -> Self {
        Rpl {
            parents:      ParentSet::new(of::from_settings(settings)),
            trickle:      TrickleTimer::for_dio(),
            dodag_id:     None,
            version:      0,
            started:      false,
            dis_sent:     0,
            parent_child: BTreeMap::new(),
        }
    }
}

impl Mote {
    pub fn rpl_rank(&self) -> u16 {
        if self.is_root {
            ROOT_RANK
        } else {
            self.rpl.parents.rank().unwrap_or(INFINITE_RANK)
        }
    }

    pub fn rpl_preferred_parent(&self) -> Option<Eui64> {
        self.rpl.parents.parent()
    }

    pub fn rpl_compute_source_route(&self, target: Ipv6Addr) -> Option<Vec<Ipv6Addr>> {
        compute_source_route(&self.rpl.parent_child, self.eui64.global(), target)
    }

    /// Record a child → parent edge (root only).
    pub fn rpl_add_parent_child(&mut self, child: Ipv6Addr, parent: Ipv6Addr) {
        self.rpl.parent_child.insert(child, parent);
    }

    /// Start RPL (the mote just joined).
    pub(crate) fn rpl_start(&mut self, ctx: &mut Ctx) {
        if self.rpl.started {
            return;
        }
        self.rpl.started = true;
        if self.is_root {
            self.rpl.dodag_id = Some(self.eui64.global());
            self.rpl_trickle_start(ctx);
        } else if self.rpl_preferred_parent().is_none() {
            ctx.schedule_in(self.id, Timer::Dis, 1);
        }
    }

    pub(crate) fn rpl_reset(&mut self, ctx: &mut Ctx) {
        for timer in [Timer::TrickleTransmit, Timer::TrickleIntervalEnd, Timer::Dao, Timer::Dis] {
            ctx.cancel(self.id, timer);
        }
        self.rpl.parents.clear();
        self.rpl.trickle.stop();
        self.rpl.started = false;
        self.rpl.dis_sent = 0;
        self.rpl.dodag_id = None;
    }

    // ── Trickle ───────────────────────────────────────────────────────────

    fn rpl_trickle_schedule(&self, ctx: &mut Ctx, interval: TrickleInterval) {
        ctx.schedule_in_secs(self.id, Timer::TrickleTransmit, interval.t_ms / 1000.0);
        ctx.schedule_in_secs(self.id, Timer::TrickleIntervalEnd, interval.i_ms / 1000.0);
    }

    fn rpl_trickle_start(&mut self, ctx: &mut Ctx) {
        let interval = self.rpl.trickle.start(ctx.rng);
        self.rpl_trickle_schedule(ctx, interval);
    }

    fn rpl_trickle_reset(&mut self, ctx: &mut Ctx) {
        if let Some(interval) = self.rpl.trickle.reset(ctx.rng) {
            self.rpl_trickle_schedule(ctx, interval);
        }
    }

    pub(crate) fn on_trickle_transmit(&mut self, ctx: &mut Ctx) {
        if self.rpl.trickle.should_transmit() {
            self.rpl_send_dio(ctx, ALL_RPL_NODES);
        }
    }

    pub(crate) fn on_trickle_interval_end(&mut self, ctx: &mut Ctx) {
        if self.rpl.trickle.is_running() {
            let interval = self.rpl.trickle.end_interval(ctx.rng);
            self.rpl_trickle_schedule(ctx, interval);
        }
    }

    // ── DIO ───────────────────────────────────────────────────────────────

    fn rpl_dio(&self, ctx: &mut Ctx, dst: Ipv6Addr, rank: u16) -> Packet {
        let net = NetHeader::new(self.eui64.link_local(), dst, DIO_LENGTH);
        Packet::network(ctx.new_uid(), PacketType::Dio, self.eui64, net, Payload::Dio {
            rank,
            dodag_id: self.rpl.dodag_id.unwrap_or_else(|| ctx.net.root_global()),
            version: self.rpl.version,
        })
    }

    fn rpl_send_dio(&mut self, ctx: &mut Ctx, dst: Ipv6Addr) {
        let rank = self.rpl_rank();
        if rank == INFINITE_RANK {
            return;
        }
        self.rpl_emit_dio(ctx, dst, rank);
    }

    fn rpl_emit_dio(&mut self, ctx: &mut Ctx, dst: Ipv6Addr, rank: u16) {
        let dio = self.rpl_dio(ctx, dst, rank);
        ctx.log(self.id, LogEvent::RplDioTx { packet: dio.info(), rank });
        self.sixlowpan_send(ctx, dio);
    }

    pub(crate) fn rpl_on_dio(&mut self, ctx: &mut Ctx, packet: &Packet) {
        let Payload::Dio { rank, dodag_id, .. } = packet.payload else {
            return;
        };
        if self.is_root || !self.rpl.started {
            return;
        }
        self.rpl.dodag_id.get_or_insert(dodag_id);
        let src = packet.mac.src;
        let was_known = self.rpl.parents.neighbor(src).map(|n| n.rank);
        self.rpl.parents.update_neighbor(src, rank);

        let change = self.rpl.parents.select();
        match change {
            Some(change) => self.rpl_apply_change(ctx, change),
            None if was_known == Some(rank) => self.rpl.trickle.heard_consistent(),
            None => {}
        }
    }

    // ── Parent changes ────────────────────────────────────────────────────

    fn rpl_apply_change(&mut self, ctx: &mut Ctx, change: ParentChange) {
        if change.old_parent == change.new_parent {
            // Rank moved through the same parent.
            self.rpl_trickle_reset(ctx);
            return;
        }
        ctx.log(self.id, LogEvent::RplChurn {
            rank:       change.new_rank,
            old_parent: change.old_parent,
            new_parent: change.new_parent,
        });
        self.sf_on_parent_change(ctx, change.old_parent, change.new_parent);

        match change.new_parent {
            Some(parent) => {
                self.tsch_set_clock_source(parent);
                ctx.cancel(self.id, Timer::Dis);
                if self.rpl.trickle.is_running() {
                    self.rpl_trickle_reset(ctx);
                } else {
                    self.rpl_trickle_start(ctx);
                }
                ctx.schedule_in_secs(self.id, Timer::Dao, DAO_AFTER_PARENT_CHANGE_S);
                self.app_on_parent(ctx);
            }
            None => {
                // Detached: poison the sub-DODAG, then look for a new parent.
                self.rpl_emit_dio(ctx, ALL_RPL_NODES, INFINITE_RANK);
                self.rpl.trickle.stop();
                ctx.cancel(self.id, Timer::TrickleTransmit);
                ctx.cancel(self.id, Timer::TrickleIntervalEnd);
                ctx.cancel(self.id, Timer::Dao);
                self.rpl.dis_sent = 0;
                ctx.schedule_in(self.id, Timer::Dis, 1);
            }
        }
    }

    pub(crate) fn rpl_on_tx_done(&mut self, ctx: &mut Ctx, dst: Eui64, acked: bool) {
        self.rpl.parents.record_tx(dst, acked);
        if Some(dst) == self.rpl_preferred_parent() {
            if let Some(change) = self.rpl.parents.evict_if_unacceptable() {
                self.rpl_apply_change(ctx, change);
            }
        }
    }

    /// Install `parent` directly (forced initial state).
    pub fn rpl_force_parent(&mut self, ctx: &mut Ctx, parent: Eui64, parent_rank: u16) {
        self.rpl.started = true;
        self.rpl.dodag_id = Some(ctx.net.root_global());
        let old = self.rpl_preferred_parent();
        self.rpl.parents.force_parent(Neighbor::new(parent, parent_rank));
        self.tsch_set_clock_source(parent);
        ctx.log(self.id, LogEvent::RplChurn {
            rank:       self.rpl.parents.rank(),
            old_parent: old,
            new_parent: Some(parent),
        });
        ctx.cancel(self.id, Timer::Dis);
        self.sf_on_forced_parent(ctx, parent);
        self.rpl_trickle_start(ctx);
        ctx.schedule_in_secs(self.id, Timer::Dao, DAO_AFTER_PARENT_CHANGE_S);
        self.app_on_parent(ctx);
    }

    // ── DIS ───────────────────────────────────────────────────────────────

    pub(crate) fn on_dis_timer(&mut self, ctx: &mut Ctx) {
        if !self.rpl.started || self.is_root || self.rpl_preferred_parent().is_some() {
            return;
        }
        let unicast_first = ctx.settings.has_rpl_extension("dis_unicast") && self.rpl.dis_sent == 0;
        let dst = match self.tsch.clock_source {
            Some(source) if unicast_first => source.link_local(),
            _ => ALL_RPL_NODES,
        };
        self.rpl.dis_sent += 1;
        let net = NetHeader::new(self.eui64.link_local(), dst, DIS_LENGTH);
        let dis = Packet::network(ctx.new_uid(), PacketType::Dis, self.eui64, net, Payload::Dis);
        self.sixlowpan_send(ctx, dis);
        ctx.schedule_in_secs(self.id, Timer::Dis, DEFAULT_DIS_INTERVAL_S);
    }

    pub(crate) fn rpl_on_dis(&mut self, ctx: &mut Ctx, packet: &Packet) {
        if !self.rpl.started || (!self.is_root && self.rpl_preferred_parent().is_none()) {
            return;
        }
        let multicast = packet.net.as_ref().is_some_and(|n| ts_core::is_multicast(n.dst));
        if multicast {
            self.rpl_trickle_reset(ctx);
        } else {
            self.rpl_send_dio(ctx, packet.mac.src.link_local());
        }
    }

    // ── DAO ───────────────────────────────────────────────────────────────

    pub(crate) fn on_dao_timer(&mut self, ctx: &mut Ctx) {
        if self.is_root {
            return;
        }
        let Some(parent) = self.rpl_preferred_parent() else {
            return;
        };
        let root = ctx.net.root_global();
        let net = NetHeader::new(self.eui64.global(), root, DAO_LENGTH);
        let dao = Packet::network(ctx.new_uid(), PacketType::Dao, self.eui64, net, Payload::Dao {
            child:  self.eui64.global(),
            parent: parent.global(),
        });
        self.sixlowpan_send(ctx, dao);

        let period = ctx.settings.rpl_dao_period * ctx.rng.gen_range(DAO_JITTER_MIN..DAO_JITTER_MAX);
        ctx.schedule_in_secs(self.id, Timer::Dao, period);
    }

    pub(crate) fn rpl_on_dao(&mut self, ctx: &mut Ctx, packet: &Packet) {
        let Payload::Dao { child, parent } = packet.payload else {
            return;
        };
        if !self.is_root {
            return;
        }
        self.rpl_add_parent_child(child, parent);
        ctx.log(self.id, LogEvent::RplDaoRx { child, parent });
    }
}
