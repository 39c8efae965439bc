//! Simulation time model.
//!
//! # Design
//!
//! Time is the Absolute Slot Number (`Asn`): a monotonically increasing
//! counter advanced once per TSCH slot.  The mapping to seconds is held in
//! `SlotClock`:
//!
//!   seconds = asn * slot_duration_s
//!
//! Every timer in the stack is expressed in whole slots, so all schedule
//! arithmetic is exact and comparisons are O(1).  Durations configured in
//! seconds are rounded *up* to the next slot boundary so a timer never
//! fires early.

use std::fmt;

// ── Asn ───────────────────────────────────────────────────────────────────────

/// An absolute slot number.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Asn(pub u64);

impl Asn {
    pub const ZERO: Asn = Asn(0);

    /// Return the ASN `n` slots after `self`.
    #[inline]
    pub fn offset(self, n: u64) -> Asn {
        Asn(self.0 + n)
    }

    /// Slots elapsed from `earlier` to `self`, saturating at zero.
    #[inline]
    pub fn since(self, earlier: Asn) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Slot offset of this ASN inside a slotframe of `length` slots.
    #[inline]
    pub fn slot_offset(self, length: u32) -> u32 {
        (self.0 % length as u64) as u32
    }
}

impl std::ops::Add<u64> for Asn {
    type Output = Asn;
    #[inline]
    fn add(self, rhs: u64) -> Asn {
        Asn(self.0 + rhs)
    }
}

impl std::ops::Sub for Asn {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Asn) -> u64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asn{}", self.0)
    }
}

// ── SlotClock ─────────────────────────────────────────────────────────────────

/// Converts between slot counts and seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SlotClock {
    /// Duration of one TSCH slot in seconds (typically 0.010).
    pub slot_duration_s: f64,
}

impl SlotClock {
    pub fn new(slot_duration_s: f64) -> Self {
        SlotClock { slot_duration_s }
    }

    /// Seconds elapsed at `asn`.
    #[inline]
    pub fn seconds_at(&self, asn: Asn) -> f64 {
        asn.0 as f64 * self.slot_duration_s
    }

    /// Number of whole slots covering `secs`, rounded up.  Never returns 0
    /// for a positive duration.
    pub fn slots_for(&self, secs: f64) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        // Guard against 0.3 / 0.01 = 29.999999999999996 style artefacts.
        let raw = secs / self.slot_duration_s;
        let rounded = raw.round();
        let slots = if (raw - rounded).abs() < 1e-9 { rounded } else { raw.ceil() };
        (slots as u64).max(1)
    }

    /// Milliseconds converted to slots, rounded up.
    #[inline]
    pub fn slots_for_ms(&self, ms: u64) -> u64 {
        self.slots_for(ms as f64 / 1000.0)
    }
}

impl Default for SlotClock {
    fn default() -> Self {
        SlotClock { slot_duration_s: 0.010 }
    }
}
