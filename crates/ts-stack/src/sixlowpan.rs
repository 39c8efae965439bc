//! 6LoWPAN: next-hop resolution, fragmentation, reassembly and fragment
//! forwarding.
//!
//! Next hop, first match wins:
//!
//! | destination | next hop |
//! |---|---|
//! | multicast | MAC broadcast |
//! | link-local | the EUI-64 embedded in the address |
//! | packet carries a source route | its first remaining hop |
//! | this mote is the root | first hop of a freshly computed source route |
//! | anything else | the preferred parent |
//!
//! In fragment-forwarding mode an intermediate hop keeps a virtual
//! reassembly buffer (VRB) entry per datagram instead of reassembling it.

use std::collections::{BTreeMap, BTreeSet};

use ts_core::{DropReason, Eui64, Fragmentation, LogEvent, PacketInfo};

use crate::packet::FragInfo;
use crate::{Ctx, Mote, Packet, PacketType, Payload, Timer};

/// Fragment header size in bytes.
pub const FRAG_HEADER_LEN: u32 = 5;
pub const REASSEMBLY_BUFFER_LIFETIME_S: f64 = 60.0;
pub const VRB_TABLE_ENTRY_LIFETIME_S: f64 = 60.0;

/// Split `packet` into fragments fitting `mtu` bytes of payload.
///
/// Each fragment carries `length` bytes of the datagram (a multiple of 8
/// except for the last one); the first one also carries the datagram
/// itself so the reassembler can restore it.  Packets that fit are
/// returned unchanged.
pub fn fragment(packet: &Packet, mtu: u32, tag: u16, mut new_uid: impl FnMut() -> u64) -> Vec<Packet> {
    let size = packet.length();
    if size <= mtu {
        return vec![packet.clone()];
    }
    let chunk = ((mtu.saturating_sub(FRAG_HEADER_LEN)) / 8 * 8).max(8);
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < size {
        let length = chunk.min(size - offset);
        let mut frag = packet.clone();
        frag.uid = new_uid();
        frag.kind = PacketType::Frag;
        frag.payload = Payload::Fragment { datagram: (offset == 0).then(|| Box::new(packet.clone())) };
        if let Some(net) = frag.net.as_mut() {
            net.packet_length = length + FRAG_HEADER_LEN;
            net.frag = Some(FragInfo { size, tag, offset, length });
        }
        out.push(frag);
        offset += length;
    }
    out
}

/// Fragments of one datagram being reassembled.
#[derive(Clone, Debug, Default)]
pub struct Reassembly {
    size:     u32,
    offsets:  BTreeSet<u32>,
    received: u32,
    datagram: Option<Packet>,
    info:     Option<PacketInfo>,
}

impl Reassembly {
    /// Add a fragment; returns the datagram once every byte arrived.
    pub fn add(&mut self, frag: &Packet) -> Option<Packet> {
        let info = frag.net.as_ref()?.frag?;
        self.size = info.size;
        if self.info.is_none() {
            self.info = Some(frag.info());
        }
        if self.offsets.insert(info.offset) {
            self.received += info.length;
        }
        if let Payload::Fragment { datagram: Some(d) } = &frag.payload {
            self.datagram = Some((**d).clone());
        }
        if self.received >= self.size {
            return self.datagram.take();
        }
        None
    }

    pub fn info(&self) -> Option<&PacketInfo> {
        self.info.as_ref()
    }
}

#[derive(Clone, Debug)]
struct VrbEntry {
    next_hop:    Eui64,
    out_tag:     u16,
    /// Offset expected next (missing-fragment policy).
    next_offset: u32,
    forwarded:   u32,
    size:        u32,
    /// The datagram as forwarded, with its updated IPv6 header.
    outgoing:    Packet,
}

#[derive(Debug, Default)]
pub struct Sixlowpan {
    next_tag:   u16,
    reassembly: BTreeMap<(Eui64, u16), Reassembly>,
    vrb:        BTreeMap<(Eui64, u16), VrbEntry>,
}

impl Sixlowpan {
    fn new_tag(&mut self) -> u16 {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        tag
    }

    pub fn reassembly_buffers_in_use(&self) -> usize {
        self.reassembly.len()
    }

    pub fn vrb_entries(&self) -> usize {
        self.vrb.len()
    }
}

impl Mote {
    fn is_for_me(&self, dst: std::net::Ipv6Addr) -> bool {
        ts_core::is_multicast(dst) || dst == self.eui64.link_local() || dst == self.eui64.global()
    }

    /// Resolve the MAC next hop, consuming a source-route hop if needed.
    fn next_hop(&self, packet: &mut Packet) -> Result<Eui64, DropReason> {
        let Some(net) = packet.net.as_mut() else {
            return Ok(packet.mac.dst);
        };
        let dst = net.dst;
        if ts_core::is_multicast(dst) {
            return Ok(Eui64::BROADCAST);
        }
        if ts_core::is_link_local(dst) {
            return Eui64::from_ipv6(dst).ok_or(DropReason::NoRoute);
        }
        if !net.source_route.is_empty() {
            let hop = net.source_route.remove(0);
            return Eui64::from_ipv6(hop).ok_or(DropReason::NoRoute);
        }
        if self.is_root {
            let mut route = self.rpl_compute_source_route(dst).ok_or(DropReason::NoRoute)?;
            if route.is_empty() {
                return Err(DropReason::NoRoute);
            }
            let first = route.remove(0);
            net.source_route = route;
            return Eui64::from_ipv6(first).ok_or(DropReason::NoRoute);
        }
        self.rpl_preferred_parent().ok_or(DropReason::NoParent)
    }

    /// Route, fragment if needed, and queue an IPv6 packet.
    pub fn sixlowpan_send(&mut self, ctx: &mut Ctx, mut packet: Packet) -> bool {
        let next_hop = match self.next_hop(&mut packet) {
            Ok(hop) => hop,
            Err(reason) => {
                ctx.log(self.id, LogEvent::RplDrop { packet: packet.info(), reason });
                return false;
            }
        };
        packet.mac.src = self.eui64;
        packet.mac.dst = next_hop;

        if packet.length() <= ctx.settings.tsch_max_payload_len {
            return self.tsch_enqueue(ctx, packet);
        }
        let tag = self.sixlowpan.new_tag();
        let frags = fragment(&packet, ctx.settings.tsch_max_payload_len, tag, || ctx.new_uid());
        let mut ok = true;
        for frag in frags {
            ok &= self.tsch_enqueue(ctx, frag);
        }
        ok
    }

    /// A frame carrying an IPv6 packet (or fragment) arrived.
    pub(crate) fn sixlowpan_recv(&mut self, ctx: &mut Ctx, packet: Packet) {
        if packet.kind == PacketType::Frag {
            self.sixlowpan_recv_fragment(ctx, packet);
        } else {
            self.sixlowpan_deliver_or_forward(ctx, packet);
        }
    }

    fn sixlowpan_deliver_or_forward(&mut self, ctx: &mut Ctx, packet: Packet) {
        let Some(dst) = packet.net.as_ref().map(|n| n.dst) else {
            return;
        };
        let join_traffic = matches!(packet.kind, PacketType::JoinRequest | PacketType::JoinResponse);
        if self.is_for_me(dst) {
            if !self.secjoin.joined && !join_traffic {
                if !packet.is_broadcast() {
                    ctx.log(self.id, LogEvent::SecjoinDrop { packet: packet.info(), reason: DropReason::NotJoined });
                }
                return;
            }
            self.sixlowpan_deliver(ctx, packet);
        } else {
            self.sixlowpan_forward(ctx, packet);
        }
    }

    fn sixlowpan_deliver(&mut self, ctx: &mut Ctx, packet: Packet) {
        match packet.kind {
            PacketType::Dio => self.rpl_on_dio(ctx, &packet),
            PacketType::Dis => self.rpl_on_dis(ctx, &packet),
            PacketType::Dao => self.rpl_on_dao(ctx, &packet),
            PacketType::JoinRequest => self.secjoin_on_request(ctx, packet),
            PacketType::JoinResponse => self.secjoin_on_response(ctx, packet),
            PacketType::Data => self.app_on_rx(ctx, &packet),
            _ => {}
        }
    }

    fn sixlowpan_forward(&mut self, ctx: &mut Ctx, mut packet: Packet) {
        if !self.secjoin.joined {
            ctx.log(self.id, LogEvent::SecjoinDrop { packet: packet.info(), reason: DropReason::NotJoined });
            return;
        }
        let Some(net) = packet.net.as_mut() else {
            return;
        };
        if net.hop_limit <= 1 {
            ctx.log(self.id, LogEvent::RplDrop { packet: packet.info(), reason: DropReason::NoRoute });
            return;
        }
        net.hop_limit -= 1;
        self.sixlowpan_send(ctx, packet);
    }

    // ── Fragments ─────────────────────────────────────────────────────────

    fn sixlowpan_recv_fragment(&mut self, ctx: &mut Ctx, frag: Packet) {
        let Some(info) = frag.net.as_ref().and_then(|n| n.frag) else {
            return;
        };
        let dst = frag.net.as_ref().map(|n| n.dst);
        let for_me = dst.is_some_and(|d| self.is_for_me(d));
        if for_me || ctx.settings.fragmentation == Fragmentation::PerHopReassembly {
            self.sixlowpan_reassemble(ctx, frag, info);
        } else {
            self.sixlowpan_forward_fragment(ctx, frag, info);
        }
    }

    fn sixlowpan_reassemble(&mut self, ctx: &mut Ctx, frag: Packet, info: FragInfo) {
        let key = (frag.mac.src, info.tag);
        if !self.sixlowpan.reassembly.contains_key(&key) {
            if self.sixlowpan.reassembly.len() >= ctx.settings.sixlowpan_reassembly_buffers_num as usize {
                ctx.log(self.id, LogEvent::SixlowpanDrop { packet: frag.info(), reason: DropReason::QueueFull });
                return;
            }
            self.sixlowpan.reassembly.insert(key, Reassembly::default());
            ctx.schedule_in_secs(self.id, Timer::ReassemblyExpiry { src: key.0, tag: key.1 }, REASSEMBLY_BUFFER_LIFETIME_S);
        }
        let done = self.sixlowpan.reassembly.get_mut(&key).and_then(|r| r.add(&frag));
        if let Some(datagram) = done {
            self.sixlowpan.reassembly.remove(&key);
            ctx.cancel(self.id, Timer::ReassemblyExpiry { src: key.0, tag: key.1 });
            self.sixlowpan_deliver_or_forward(ctx, datagram);
        }
    }

    pub(crate) fn on_reassembly_expiry(&mut self, ctx: &mut Ctx, src: Eui64, tag: u16) {
        if let Some(entry) = self.sixlowpan.reassembly.remove(&(src, tag)) {
            if let Some(info) = entry.info().cloned() {
                ctx.log(self.id, LogEvent::SixlowpanDrop { packet: info, reason: DropReason::ReassemblyTimeout });
            }
        }
    }

    fn sixlowpan_forward_fragment(&mut self, ctx: &mut Ctx, mut frag: Packet, info: FragInfo) {
        if !self.secjoin.joined {
            ctx.log(self.id, LogEvent::SecjoinDrop { packet: frag.info(), reason: DropReason::NotJoined });
            return;
        }
        let key = (frag.mac.src, info.tag);
        let timer = Timer::VrbExpiry { src: key.0, tag: key.1 };

        if info.offset == 0 {
            let Payload::Fragment { datagram: Some(datagram) } = &frag.payload else {
                return;
            };
            if self.sixlowpan.vrb.len() >= ctx.settings.fragmentation_ff_vrb_table_size as usize
                && !self.sixlowpan.vrb.contains_key(&key)
            {
                ctx.log(self.id, LogEvent::SixlowpanDrop { packet: frag.info(), reason: DropReason::QueueFull });
                return;
            }
            let mut outgoing = (**datagram).clone();
            let Some(net) = outgoing.net.as_mut() else {
                return;
            };
            if net.hop_limit <= 1 {
                ctx.log(self.id, LogEvent::RplDrop { packet: frag.info(), reason: DropReason::NoRoute });
                return;
            }
            net.hop_limit -= 1;
            let next_hop = match self.next_hop(&mut outgoing) {
                Ok(hop) => hop,
                Err(reason) => {
                    ctx.log(self.id, LogEvent::RplDrop { packet: frag.info(), reason });
                    return;
                }
            };
            let out_tag = self.sixlowpan.new_tag();
            self.sixlowpan.vrb.insert(key, VrbEntry {
                next_hop,
                out_tag,
                next_offset: 0,
                forwarded: 0,
                size: info.size,
                outgoing,
            });
            ctx.schedule_in_secs(self.id, timer.clone(), VRB_TABLE_ENTRY_LIFETIME_S);
        }

        let Some(entry) = self.sixlowpan.vrb.get_mut(&key) else {
            // The first fragment never came through, or its entry expired.
            ctx.log(self.id, LogEvent::SixlowpanDrop { packet: frag.info(), reason: DropReason::VrbTimeout });
            return;
        };
        if ctx.settings.has_vrb_discard_policy("missing_fragment") && info.offset != entry.next_offset {
            self.sixlowpan.vrb.remove(&key);
            ctx.cancel(self.id, timer);
            ctx.log(self.id, LogEvent::SixlowpanDrop { packet: frag.info(), reason: DropReason::VrbTimeout });
            return;
        }
        entry.next_offset = info.offset + info.length;
        entry.forwarded += info.length;

        frag.uid = ctx.new_uid();
        frag.mac.dst = entry.next_hop;
        if let Some(net) = frag.net.as_mut() {
            net.frag = Some(FragInfo { tag: entry.out_tag, ..info });
            if let Some(out_net) = entry.outgoing.net.as_ref() {
                net.hop_limit = out_net.hop_limit;
                net.source_route = out_net.source_route.clone();
            }
        }
        if info.offset == 0 {
            frag.payload = Payload::Fragment { datagram: Some(Box::new(entry.outgoing.clone())) };
        }
        let done = entry.forwarded >= entry.size;
        if done && ctx.settings.has_vrb_discard_policy("last_fragment") {
            self.sixlowpan.vrb.remove(&key);
            ctx.cancel(self.id, timer);
        }
        self.tsch_enqueue(ctx, frag);
    }

    pub(crate) fn on_vrb_expiry(&mut self, ctx: &mut Ctx, src: Eui64, tag: u16) {
        if let Some(entry) = self.sixlowpan.vrb.remove(&(src, tag)) {
            if entry.forwarded < entry.size {
                let mut info = entry.outgoing.info();
                info.kind = PacketType::Frag.as_str().to_string();
                ctx.log(self.id, LogEvent::SixlowpanDrop { packet: info, reason: DropReason::VrbTimeout });
            }
        }
    }

    pub(crate) fn sixlowpan_reset(&mut self, ctx: &mut Ctx) {
        let timers: Vec<Timer> = self
            .sixlowpan
            .reassembly
            .keys()
            .map(|&(src, tag)| Timer::ReassemblyExpiry { src, tag })
            .chain(self.sixlowpan.vrb.keys().map(|&(src, tag)| Timer::VrbExpiry { src, tag }))
            .collect();
        for timer in timers {
            ctx.cancel(self.id, timer);
        }
        self.sixlowpan = Sixlowpan::default();
    }
}
