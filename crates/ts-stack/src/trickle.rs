//! Trickle timer (RFC 6206).
//!
//! Pure interval bookkeeping; the RPL layer turns the returned
//! [`TrickleInterval`] into `TrickleTransmit` / `TrickleIntervalEnd` timers.

use ts_core::SimRng;

/// DIO Trickle defaults: Imin = 2^3 ms, 20 doublings, redundancy 10.
pub const DIO_INTERVAL_MIN_MS: f64 = 8.0;
pub const DIO_INTERVAL_DOUBLINGS: u32 = 20;
pub const DIO_REDUNDANCY_CONSTANT: u32 = 10;

/// One interval: transmit point `t` and interval length `i`, both in ms
/// from the start of the interval.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrickleInterval {
    pub t_ms: f64,
    pub i_ms: f64,
}

#[derive(Clone, Debug)]
pub struct TrickleTimer {
    imin_ms:       f64,
    max_doublings: u32,
    k:             u32,
    interval_ms:   f64,
    counter:       u32,
    running:       bool,
}

impl TrickleTimer {
    pub fn new(imin_ms: f64, max_doublings: u32, k: u32) -> Self {
        TrickleTimer { imin_ms, max_doublings, k, interval_ms: imin_ms, counter: 0, running: false }
    }

    pub fn for_dio() -> Self {
        Self::new(DIO_INTERVAL_MIN_MS, DIO_INTERVAL_DOUBLINGS, DIO_REDUNDANCY_CONSTANT)
    }

    pub fn imax_ms(&self) -> f64 {
        self.imin_ms * f64::from(1u32 << self.max_doublings.min(31))
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start at `Imin`.
    pub fn start(&mut self, rng: &mut SimRng) -> TrickleInterval {
        self.running = true;
        self.interval_ms = self.imin_ms;
        self.begin_interval(rng)
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.counter = 0;
        self.interval_ms = self.imin_ms;
    }

    fn begin_interval(&mut self, rng: &mut SimRng) -> TrickleInterval {
        self.counter = 0;
        let half = self.interval_ms / 2.0;
        let t_ms = half + rng.unit() * half;
        TrickleInterval { t_ms, i_ms: self.interval_ms }
    }

    /// A consistent transmission was heard.
    pub fn heard_consistent(&mut self) {
        self.counter = self.counter.saturating_add(1);
    }

    /// Whether to transmit at `t` of the current interval.
    pub fn should_transmit(&self) -> bool {
        self.counter < self.k
    }

    /// The interval expired: double it (up to `Imax`) and begin the next.
    pub fn end_interval(&mut self, rng: &mut SimRng) -> TrickleInterval {
        self.interval_ms = (self.interval_ms * 2.0).min(self.imax_ms());
        self.begin_interval(rng)
    }

    /// Inconsistency heard.  Restarts at `Imin` unless already there.
    pub fn reset(&mut self, rng: &mut SimRng) -> Option<TrickleInterval> {
        if !self.running {
            return None;
        }
        if self.interval_ms > self.imin_ms {
            self.interval_ms = self.imin_ms;
            Some(self.begin_interval(rng))
        } else {
            None
        }
    }
}
