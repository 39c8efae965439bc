//! Application traffic: every non-root mote sends DATA packets to the root.

use ts_core::{AppClass, DropReason, LogEvent};

use crate::packet::NetHeader;
use crate::{Ctx, Mote, Packet, PacketType, Payload, Timer};

#[derive(Debug, Default)]
pub struct App {
    /// Packets generated so far.
    pub counter: u64,
    started:     bool,
}

impl Mote {
    /// Start generating traffic once the mote is joined and has a parent.
    pub(crate) fn app_on_parent(&mut self, ctx: &mut Ctx) {
        if self.is_root || self.app.started || !self.secjoin.joined || self.rpl_preferred_parent().is_none() {
            return;
        }
        self.app.started = true;
        match ctx.settings.app {
            AppClass::AppPeriodic => {
                let first = ctx.rng.unit() * ctx.settings.app_pk_period;
                let slots = ctx.slots_for(first);
                ctx.schedule_in(self.id, Timer::AppTx, slots);
            }
            AppClass::AppBurst => {
                let at = ctx.settings.app_burst_timestamp.unwrap_or(0.0);
                let target = ts_core::Asn(ctx.slots_for(at));
                let asn = if target > ctx.asn { target } else { ctx.asn + 1 };
                ctx.schedule(self.id, Timer::AppTx, asn, ts_engine::IntraSlotOrder::StackTasks);
            }
        }
    }

    pub(crate) fn app_stop(&mut self, ctx: &mut Ctx) {
        ctx.cancel(self.id, Timer::AppTx);
        self.app.started = false;
    }

    pub(crate) fn on_app_tx(&mut self, ctx: &mut Ctx) {
        match ctx.settings.app {
            AppClass::AppPeriodic => {
                self.app_send(ctx);
                let var = ctx.settings.app_pk_period_var;
                let factor = if var > 0.0 { ctx.rng.gen_range(1.0 - var..=1.0 + var) } else { 1.0 };
                let period = ctx.settings.app_pk_period * factor;
                ctx.schedule_in_secs(self.id, Timer::AppTx, period);
            }
            AppClass::AppBurst => {
                for _ in 0..ctx.settings.app_burst_num_packets {
                    self.app_send(ctx);
                }
            }
        }
    }

    /// Generate one DATA packet toward the root.
    pub fn app_send(&mut self, ctx: &mut Ctx) {
        self.app.counter += 1;
        let net = NetHeader::new(self.eui64.global(), ctx.net.root_global(), ctx.settings.app_pk_length);
        let packet = Packet::network(ctx.new_uid(), PacketType::Data, self.eui64, net, Payload::Data {
            app_counter: self.app.counter,
            created_at:  ctx.asn,
        });
        ctx.log(self.id, LogEvent::AppTx { packet: packet.info() });
        if !self.secjoin.joined {
            ctx.log(self.id, LogEvent::AppDrop { packet: packet.info(), reason: DropReason::NotJoined });
            return;
        }
        if self.rpl_preferred_parent().is_none() {
            ctx.log(self.id, LogEvent::AppDrop { packet: packet.info(), reason: DropReason::NoParent });
            return;
        }
        self.sixlowpan_send(ctx, packet);
    }

    pub(crate) fn app_on_rx(&mut self, ctx: &mut Ctx, packet: &Packet) {
        ctx.log(self.id, LogEvent::AppRx { packet: packet.info() });
    }
}
