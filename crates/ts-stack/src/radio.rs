//! Radio state and energy accounting.
//!
//! Each slot the radio is in exactly one state.  `Tx` and `Rx` carry what
//! the propagation step needs; it is reset to `Off` when the slot resolves.

use ts_core::{Asn, LogEvent, MoteId};

use crate::{Ctx, Mote, Packet};

#[derive(Clone, Debug, Default, PartialEq)]
pub enum RadioState {
    #[default]
    Off,
    Tx { packet: Box<Packet>, channel: u8 },
    Rx { channel: u8 },
}

/// Slot counters since boot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RadioStats {
    pub tx:          u64,
    /// Listening slots in which a frame was received.
    pub rx:          u64,
    /// Listening slots in which nothing was received.
    pub idle_listen: u64,
}

impl RadioStats {
    /// Slots spent asleep out of `elapsed`.
    pub fn sleep(&self, elapsed: u64) -> u64 {
        elapsed.saturating_sub(self.tx + self.rx + self.idle_listen)
    }
}

#[derive(Debug, Default)]
pub struct Radio {
    pub state: RadioState,
    pub stats: RadioStats,
}

impl Radio {
    pub fn start_tx(&mut self, packet: Packet, channel: u8) {
        self.state = RadioState::Tx { packet: Box::new(packet), channel };
    }

    pub fn start_rx(&mut self, channel: u8) {
        self.state = RadioState::Rx { channel };
    }

    /// End the slot's activity, updating the counters.
    pub fn finish(&mut self, received: bool) {
        match self.state {
            RadioState::Off => {}
            RadioState::Tx { .. } => self.stats.tx += 1,
            RadioState::Rx { .. } if received => self.stats.rx += 1,
            RadioState::Rx { .. } => self.stats.idle_listen += 1,
        }
        self.state = RadioState::Off;
    }

    pub fn stats_event(&self, asn: Asn) -> LogEvent {
        LogEvent::RadioStats {
            tx:          self.stats.tx,
            rx:          self.stats.rx,
            idle_listen: self.stats.idle_listen,
            sleep:       self.stats.sleep(asn.0),
        }
    }
}

impl Mote {
    /// Periodic `radio.stats` record.
    pub(crate) fn on_radio_stats_timer(&mut self, ctx: &mut Ctx) {
        ctx.log(self.id, self.radio.stats_event(ctx.asn));
        self.schedule_radio_stats(ctx);
    }

    pub(crate) fn schedule_radio_stats(&self, ctx: &mut Ctx) {
        let period = ctx.settings.radio_stats_log_period_s;
        if period > 0.0 {
            ctx.schedule_in_secs(self.id, crate::Timer::RadioStats, period);
        }
    }

    /// Final `radio.stats` record of the run.
    pub fn log_radio_stats(&self, ctx: &mut Ctx) {
        ctx.log(self.id, self.radio.stats_event(ctx.asn));
    }

    pub fn id(&self) -> MoteId {
        self.id
    }
}
