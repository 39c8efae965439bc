//! Per-slot frame delivery.
//!
//! # Algorithm
//!
//! For every listener, in ascending mote id:
//!
//! 1. Gather the transmissions on the listener's channel whose PDR toward
//!    the listener is non-zero.  If there is more than one, they collide
//!    and the listener receives nothing.
//! 2. A lone transmission that is unicast to another mote is ignored.
//! 3. A lone transmission whose sender's clock differs from the
//!    listener's by more than the guard time is missed.
//! 4. Otherwise draw `u ∈ [0, 1)`; the frame is received iff `u < pdr`.
//!
//! A received unicast frame addressed to the listener is acknowledged.  With
//! ACK loss enabled, a second draw against the reverse-direction PDR decides
//! whether the ACK gets back.
//!
//! All draws come from the run's RNG in the order above, so the outcome is
//! a pure function of the inputs and the RNG state.

use ts_core::{MoteId, SimRng};

use crate::ConnectivityMatrix;

/// Receiver guard time around the expected frame start, in microseconds.
pub const GUARD_TIME_US: f64 = 2200.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Transmission {
    pub src:     MoteId,
    /// `None` for broadcast frames.
    pub dst:     Option<MoteId>,
    pub channel: u8,
    /// Offset of the sender's clock from true time.
    pub clock_offset_us: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Listener {
    pub mote:    MoteId,
    pub channel: u8,
    pub clock_offset_us: f64,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct PropagationParams {
    pub simulate_ack_drop: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropagationOutcome {
    /// For each listener (in input order), the index of the transmission it
    /// received, if any.
    pub received: Vec<Option<usize>>,
    /// For each transmission (in input order), whether an ACK came back.
    pub acked:    Vec<bool>,
}

pub fn propagate(
    matrix:        &ConnectivityMatrix,
    transmissions: &[Transmission],
    listeners:     &[Listener],
    params:        PropagationParams,
    rng:           &mut SimRng,
) -> PropagationOutcome {
    let mut out = PropagationOutcome {
        received: vec![None; listeners.len()],
        acked:    vec![false; transmissions.len()],
    };
    if transmissions.is_empty() || listeners.is_empty() {
        return out;
    }

    let mut order: Vec<usize> = (0..listeners.len()).collect();
    order.sort_by_key(|&i| listeners[i].mote);

    for li in order {
        let l = &listeners[li];
        let mut audible = transmissions.iter().enumerate().filter(|(_, t)| {
            t.src != l.mote && t.channel == l.channel && matrix.get_pdr(t.src, l.mote, l.channel) > 0.0
        });
        let Some((ti, tx)) = audible.next() else {
            continue;
        };
        if audible.next().is_some() {
            // Collision.
            continue;
        }
        if tx.dst.is_some_and(|d| d != l.mote) {
            continue;
        }
        if (tx.clock_offset_us - l.clock_offset_us).abs() > GUARD_TIME_US {
            continue;
        }
        let pdr = matrix.get_pdr(tx.src, l.mote, l.channel);
        if rng.unit() >= pdr {
            continue;
        }
        out.received[li] = Some(ti);

        if tx.dst == Some(l.mote) {
            out.acked[ti] = if params.simulate_ack_drop {
                rng.unit() < matrix.get_pdr(l.mote, tx.src, l.channel)
            } else {
                true
            };
        }
    }
    out
}
