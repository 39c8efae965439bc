//! Radio propagation helpers for the random topology.
//!
//! RSSI is computed with the Friis free-space equation and then lowered by
//! a uniform random shift (the "Pister hack") to approximate the spread of
//! real indoor links.  PDR follows from RSSI through a measured reception
//! table, linearly interpolated.

use ts_core::SimRng;

/// 2.4 GHz wavelength in metres.
const WAVELENGTH_M: f64 = 299_792_458.0 / 2.4e9;
pub const TX_POWER_DBM: f64 = 0.0;
pub const PISTER_HACK_LOWER_SHIFT_DB: f64 = 40.0;

/// `(rssi dBm, pdr)` pairs, ascending RSSI.
const RSSI_PDR_TABLE: [(f64, f64); 19] = [
    (-97.0, 0.0000),
    (-96.0, 0.1494),
    (-95.0, 0.2340),
    (-94.0, 0.4071),
    (-93.0, 0.6359),
    (-92.0, 0.6866),
    (-91.0, 0.7476),
    (-90.0, 0.8603),
    (-89.0, 0.8702),
    (-88.0, 0.9324),
    (-87.0, 0.9427),
    (-86.0, 0.9562),
    (-85.0, 0.9611),
    (-84.0, 0.9739),
    (-83.0, 0.9745),
    (-82.0, 0.9844),
    (-81.0, 0.9854),
    (-80.0, 0.9903),
    (-79.0, 1.0000),
];

/// Free-space received power at `distance_m`.
pub fn friis_rssi(distance_m: f64) -> f64 {
    let d = distance_m.max(1e-3);
    TX_POWER_DBM + 20.0 * (WAVELENGTH_M / (4.0 * std::f64::consts::PI * d)).log10()
}

/// Friis RSSI lowered by a random shift in `[0, PISTER_HACK_LOWER_SHIFT_DB)`.
pub fn pister_hack_rssi(distance_m: f64, rng: &mut SimRng) -> f64 {
    friis_rssi(distance_m) - rng.unit() * PISTER_HACK_LOWER_SHIFT_DB
}

pub fn rssi_to_pdr(rssi: f64) -> f64 {
    let (lo_rssi, _) = RSSI_PDR_TABLE[0];
    let (hi_rssi, _) = RSSI_PDR_TABLE[RSSI_PDR_TABLE.len() - 1];
    if rssi <= lo_rssi {
        return 0.0;
    }
    if rssi >= hi_rssi {
        return 1.0;
    }
    for w in RSSI_PDR_TABLE.windows(2) {
        let ((r0, p0), (r1, p1)) = (w[0], w[1]);
        if rssi <= r1 {
            return p0 + (p1 - p0) * (rssi - r0) / (r1 - r0);
        }
    }
    1.0
}

/// Inverse of [`rssi_to_pdr`] (the table is monotone).
pub fn pdr_to_rssi(pdr: f64) -> f64 {
    if pdr >= 1.0 {
        return RSSI_PDR_TABLE[RSSI_PDR_TABLE.len() - 1].0;
    }
    for w in RSSI_PDR_TABLE.windows(2) {
        let ((r0, p0), (r1, p1)) = (w[0], w[1]);
        if pdr <= p1 {
            if p1 == p0 {
                return r0;
            }
            return r0 + (r1 - r0) * (pdr - p0) / (p1 - p0);
        }
    }
    RSSI_PDR_TABLE[RSSI_PDR_TABLE.len() - 1].0
}
