//! Link-layer and network-layer addressing.
//!
//! Every mote has an EUI-64.  Its IPv6 link-local address is `fe80::/64`
//! followed by the interface identifier derived from the EUI-64 (U/L bit
//! inverted), and its global address uses the `fd00::/64` prefix the DAG
//! root advertises.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{MoteId, TsError};

/// Organizationally unique prefix for EUI-64s derived from mote ids.
const DERIVED_OUI: [u8; 5] = [0x00, 0x12, 0x4b, 0x00, 0x00];

pub const LINK_LOCAL_PREFIX: [u8; 8] = [0xfe, 0x80, 0, 0, 0, 0, 0, 0];
pub const GLOBAL_PREFIX: [u8; 8] = [0xfd, 0x00, 0, 0, 0, 0, 0, 0];

/// All-RPL-nodes link-scope multicast group (`ff02::1a`).
pub const ALL_RPL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x1a);

// ── Eui64 ─────────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eui64(pub [u8; 8]);

impl Eui64 {
    /// MAC broadcast address.
    pub const BROADCAST: Eui64 = Eui64([0xff; 8]);

    /// Default EUI-64 for a mote: fixed OUI prefix, id in the low 3 bytes.
    pub fn from_mote_id(id: MoteId) -> Eui64 {
        let b = id.0.to_be_bytes();
        let mut out = [0u8; 8];
        out[..5].copy_from_slice(&DERIVED_OUI);
        out[5..].copy_from_slice(&b[1..]);
        Eui64(out)
    }

    #[inline]
    pub fn is_broadcast(self) -> bool {
        self == Eui64::BROADCAST
    }

    /// Interface identifier (EUI-64 with the universal/local bit flipped).
    fn interface_id(self) -> [u8; 8] {
        let mut iid = self.0;
        iid[0] ^= 0x02;
        iid
    }

    fn with_prefix(self, prefix: [u8; 8]) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets[..8].copy_from_slice(&prefix);
        octets[8..].copy_from_slice(&self.interface_id());
        Ipv6Addr::from(octets)
    }

    pub fn link_local(self) -> Ipv6Addr {
        self.with_prefix(LINK_LOCAL_PREFIX)
    }

    pub fn global(self) -> Ipv6Addr {
        self.with_prefix(GLOBAL_PREFIX)
    }

    /// Recover the EUI-64 from a unicast IPv6 address built by
    /// [`link_local`](Self::link_local) or [`global`](Self::global).
    pub fn from_ipv6(addr: Ipv6Addr) -> Option<Eui64> {
        if is_multicast(addr) {
            return None;
        }
        let octets = addr.octets();
        let mut eui = [0u8; 8];
        eui.copy_from_slice(&octets[8..]);
        eui[0] ^= 0x02;
        Some(Eui64(eui))
    }
}

pub fn is_link_local(addr: Ipv6Addr) -> bool {
    addr.octets()[..8] == LINK_LOCAL_PREFIX
}

pub fn is_global(addr: Ipv6Addr) -> bool {
    addr.octets()[..8] == GLOBAL_PREFIX
}

pub fn is_multicast(addr: Ipv6Addr) -> bool {
    addr.octets()[0] == 0xff
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl fmt::Debug for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eui64({self})")
    }
}

impl FromStr for Eui64 {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 8];
        let mut parts = s.split('-');
        for byte in out.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| TsError::Parse(format!("EUI-64 {s:?} has fewer than 8 bytes")))?;
            if part.len() != 2 {
                return Err(TsError::Parse(format!("EUI-64 {s:?}: bad byte {part:?}")));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| TsError::Parse(format!("EUI-64 {s:?}: {e}")))?;
        }
        if parts.next().is_some() {
            return Err(TsError::Parse(format!("EUI-64 {s:?} has more than 8 bytes")));
        }
        Ok(Eui64(out))
    }
}

impl Serialize for Eui64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Eui64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
