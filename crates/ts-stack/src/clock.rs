//! Drifting mote clocks.
//!
//! Each mote's clock runs fast or slow by a fixed drift drawn at boot.  Its
//! offset from true time grows linearly from the last synchronization,
//! where it was set to the time source's offset.  The root is the time
//! reference and never drifts.

use ts_core::{Asn, SimRng, SlotClock};

#[derive(Clone, Debug)]
pub struct Clock {
    /// Drift in parts per million (µs of error per second).
    pub drift_ppm:  f64,
    base_offset_us: f64,
    synced_at:      Asn,
}

impl Clock {
    /// A perfect clock (the root's).
    pub fn reference() -> Self {
        Clock { drift_ppm: 0.0, base_offset_us: 0.0, synced_at: Asn::ZERO }
    }

    /// A clock with a drift drawn uniformly from `[-max_drift_ppm, max_drift_ppm]`.
    pub fn drifting(max_drift_ppm: f64, rng: &mut SimRng) -> Self {
        let drift_ppm = if max_drift_ppm > 0.0 {
            rng.gen_range(-max_drift_ppm..=max_drift_ppm)
        } else {
            0.0
        };
        Clock { drift_ppm, base_offset_us: 0.0, synced_at: Asn::ZERO }
    }

    /// Offset from true time at `asn`, in microseconds.
    pub fn offset_us(&self, asn: Asn, slots: &SlotClock) -> f64 {
        let elapsed_s = slots.seconds_at(Asn(asn.since(self.synced_at)));
        self.base_offset_us + self.drift_ppm * elapsed_s
    }

    /// Align to a time source whose offset at `asn` is `source_offset_us`.
    pub fn sync(&mut self, asn: Asn, source_offset_us: f64) {
        self.base_offset_us = source_offset_us;
        self.synced_at = asn;
    }

    pub fn synced_at(&self) -> Asn {
        self.synced_at
    }
}
