//! Frames and packets.
//!
//! A [`Packet`] is a MAC frame, optionally carrying an IPv6 packet
//! ([`NetHeader`]).  EBs, keep-alives and 6P messages are MAC-only.  The
//! kind is a closed set whose wire names appear in log records.

use std::net::Ipv6Addr;

use ts_core::{Asn, Eui64, PacketInfo};

use crate::sixp::SixpMessage;

pub const DIS_LENGTH: u32 = 8;
pub const DIO_LENGTH: u32 = 76;
pub const DAO_LENGTH: u32 = 20;
pub const JOIN_LENGTH: u32 = 20;

/// Initial IPv6 hop limit.
pub const DEFAULT_HOP_LIMIT: u8 = 64;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    Data,
    Frag,
    JoinRequest,
    JoinResponse,
    Dis,
    Dio,
    Dao,
    Eb,
    SixP,
    KeepAlive,
}

impl PacketType {
    pub fn as_str(self) -> &'static str {
        match self {
            PacketType::Data => "DATA",
            PacketType::Frag => "FRAG",
            PacketType::JoinRequest => "JOIN_REQUEST",
            PacketType::JoinResponse => "JOIN_RESPONSE",
            PacketType::Dis => "DIS",
            PacketType::Dio => "DIO",
            PacketType::Dao => "DAO",
            PacketType::Eb => "EB",
            PacketType::SixP => "6P",
            PacketType::KeepAlive => "KEEP_ALIVE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MacHeader {
    pub src:          Eui64,
    pub dst:          Eui64,
    /// Priority frames jump ahead of normal ones in the TX queue.
    pub priority:     bool,
    pub retries_left: u32,
    pub pending_bit:  bool,
}

/// 6LoWPAN fragment header.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FragInfo {
    /// Size of the whole datagram in bytes.
    pub size:   u32,
    pub tag:    u16,
    pub offset: u32,
    /// Bytes of the datagram carried by this fragment.
    pub length: u32,
}

impl FragInfo {
    #[inline]
    pub fn is_last(&self) -> bool {
        self.offset + self.length >= self.size
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetHeader {
    pub src:           Ipv6Addr,
    pub dst:           Ipv6Addr,
    pub hop_limit:     u8,
    pub packet_length: u32,
    /// Remaining hops of a source route, next hop first.
    pub source_route:  Vec<Ipv6Addr>,
    pub frag:          Option<FragInfo>,
}

impl NetHeader {
    pub fn new(src: Ipv6Addr, dst: Ipv6Addr, packet_length: u32) -> Self {
        NetHeader {
            src,
            dst,
            hop_limit: DEFAULT_HOP_LIMIT,
            packet_length,
            source_route: Vec::new(),
            frag: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Data { app_counter: u64, created_at: Asn },
    /// The first fragment of a datagram carries the original packet so the
    /// reassembler can restore it intact.
    Fragment { datagram: Option<Box<Packet>> },
    JoinRequest { pledge: Eui64 },
    JoinResponse { pledge: Eui64 },
    Dis,
    Dio { rank: u16, dodag_id: Ipv6Addr, version: u8 },
    Dao { child: Ipv6Addr, parent: Ipv6Addr },
    Eb { join_metric: u16 },
    SixP(SixpMessage),
    KeepAlive,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub uid:     u64,
    pub kind:    PacketType,
    pub mac:     MacHeader,
    pub net:     Option<NetHeader>,
    pub payload: Payload,
    /// Shared-cell backoff: shared TX opportunities still to skip.
    pub backoff_remaining_delay: u32,
}

impl Packet {
    /// A MAC frame with no IPv6 part.
    pub fn mac_only(uid: u64, kind: PacketType, src: Eui64, dst: Eui64, payload: Payload) -> Self {
        Packet {
            uid,
            kind,
            mac: MacHeader { src, dst, priority: false, retries_left: 0, pending_bit: false },
            net: None,
            payload,
            backoff_remaining_delay: 0,
        }
    }

    /// An IPv6 packet whose MAC addresses are filled in by the 6LoWPAN layer.
    pub fn network(uid: u64, kind: PacketType, src_mac: Eui64, net: NetHeader, payload: Payload) -> Self {
        Packet {
            uid,
            kind,
            mac: MacHeader {
                src:          src_mac,
                dst:          Eui64::BROADCAST,
                priority:     false,
                retries_left: 0,
                pending_bit:  false,
            },
            net: Some(net),
            payload,
            backoff_remaining_delay: 0,
        }
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.mac.dst.is_broadcast()
    }

    pub fn length(&self) -> u32 {
        self.net.as_ref().map_or(0, |n| n.packet_length)
    }

    pub fn info(&self) -> PacketInfo {
        PacketInfo {
            uid:     self.uid,
            kind:    self.kind.as_str().to_string(),
            mac_src: Some(self.mac.src),
            mac_dst: Some(self.mac.dst),
            net_src: self.net.as_ref().map(|n| n.src),
            net_dst: self.net.as_ref().map(|n| n.dst),
            length:  self.length(),
        }
    }
}
