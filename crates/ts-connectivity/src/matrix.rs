//! Dense per-link, per-channel connectivity storage.

use ts_core::MoteId;

use crate::pister;

/// RSSI recorded for a link with no connectivity.
pub const LINK_NONE_RSSI: f64 = -1000.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Link {
    pub pdr:  f64,
    /// Received signal strength in dBm.
    pub rssi: f64,
}

pub const LINK_NONE: Link = Link { pdr: 0.0, rssi: LINK_NONE_RSSI };

impl Link {
    /// A link with the given PDR and the RSSI the reception table implies.
    pub fn from_pdr(pdr: f64) -> Link {
        if pdr <= 0.0 {
            LINK_NONE
        } else {
            Link { pdr: pdr.min(1.0), rssi: pister::pdr_to_rssi(pdr) }
        }
    }

    /// Keep `pdr = 0 ⇔ rssi = LINK_NONE_RSSI`.
    fn normalized(self) -> Link {
        if self.pdr <= 0.0 {
            LINK_NONE
        } else if self.rssi <= LINK_NONE_RSSI {
            Link::from_pdr(self.pdr)
        } else {
            Link { pdr: self.pdr.min(1.0), rssi: self.rssi }
        }
    }
}

/// `(src, dst, channel) → Link` for every ordered mote pair and every
/// channel of the hopping sequence.
///
/// Stored as one flat `Vec` indexed `(src * n + dst) * c + channel_index`.
/// Channels outside the hopping sequence read as `LINK_NONE`.
#[derive(Clone, Debug)]
pub struct ConnectivityMatrix {
    num_motes: usize,
    channels:  Vec<u8>,
    links:     Vec<Link>,
}

impl ConnectivityMatrix {
    pub fn new(num_motes: usize, channels: Vec<u8>) -> Self {
        let links = vec![LINK_NONE; num_motes * num_motes * channels.len()];
        ConnectivityMatrix { num_motes, channels, links }
    }

    #[inline]
    pub fn num_motes(&self) -> usize {
        self.num_motes
    }

    #[inline]
    pub fn channels(&self) -> &[u8] {
        &self.channels
    }

    fn slot(&self, src: MoteId, dst: MoteId, channel: u8) -> Option<usize> {
        let (s, d) = (src.index(), dst.index());
        if s >= self.num_motes || d >= self.num_motes {
            return None;
        }
        let c = self.channels.iter().position(|&ch| ch == channel)?;
        Some((s * self.num_motes + d) * self.channels.len() + c)
    }

    pub fn get(&self, src: MoteId, dst: MoteId, channel: u8) -> Link {
        if src == dst {
            return LINK_NONE;
        }
        self.slot(src, dst, channel).map_or(LINK_NONE, |i| self.links[i])
    }

    #[inline]
    pub fn get_pdr(&self, src: MoteId, dst: MoteId, channel: u8) -> f64 {
        self.get(src, dst, channel).pdr
    }

    #[inline]
    pub fn get_rssi(&self, src: MoteId, dst: MoteId, channel: u8) -> f64 {
        self.get(src, dst, channel).rssi
    }

    /// Set one direction of one link on one channel.  Out-of-range motes or
    /// channels are ignored.
    pub fn set_link(&mut self, src: MoteId, dst: MoteId, channel: u8, link: Link) {
        if src == dst {
            return;
        }
        if let Some(i) = self.slot(src, dst, channel) {
            self.links[i] = link.normalized();
        }
    }

    /// Set one direction of a link on every channel.
    pub fn set_link_all_channels(&mut self, src: MoteId, dst: MoteId, link: Link) {
        for ch in self.channels.clone() {
            self.set_link(src, dst, ch, link);
        }
    }

    pub fn set_pdr_both_directions(&mut self, a: MoteId, b: MoteId, channel: u8, pdr: f64) {
        let link = Link::from_pdr(pdr);
        self.set_link(a, b, channel, link);
        self.set_link(b, a, channel, link);
    }

    /// Motes `src` can reach with non-zero PDR on at least one channel.
    pub fn neighbors(&self, src: MoteId) -> Vec<MoteId> {
        (0..self.num_motes as u32)
            .map(MoteId)
            .filter(|&dst| self.channels.iter().any(|&ch| self.get_pdr(src, dst, ch) > 0.0))
            .collect()
    }

    /// Mean PDR of `src → dst` across the hopping sequence.
    pub fn mean_pdr(&self, src: MoteId, dst: MoteId) -> f64 {
        if self.channels.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.channels.iter().map(|&ch| self.get_pdr(src, dst, ch)).sum();
        sum / self.channels.len() as f64
    }
}
