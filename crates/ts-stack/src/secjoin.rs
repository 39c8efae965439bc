//! Secure join (minimal CoJP exchange).
//!
//! A pledge sends `JOIN_REQUEST` to its time source, which acts as a
//! stateless join proxy: it relays the request to the JRC (the root) with
//! the pledge's identity inside, and relays the `JOIN_RESPONSE` back to the
//! pledge's link-local address.

use ts_core::{DropReason, LogEvent};

use crate::packet::{JOIN_LENGTH, NetHeader};
use crate::{Ctx, Mote, Packet, PacketType, Payload, Timer};

pub const JOIN_TIMEOUT_S: f64 = 30.0;

#[derive(Debug, Default)]
pub struct Secjoin {
    pub joined: bool,
    retries:    u32,
}

impl Mote {
    pub fn is_joined(&self) -> bool {
        self.secjoin.joined
    }

    /// Begin joining (the mote just synchronized).
    pub(crate) fn secjoin_start(&mut self, ctx: &mut Ctx) {
        if self.secjoin.joined {
            return;
        }
        if !ctx.settings.secjoin_enabled {
            self.secjoin_set_joined(ctx);
            return;
        }
        self.secjoin.retries = 0;
        self.secjoin_send_request(ctx);
    }

    pub(crate) fn secjoin_set_joined(&mut self, ctx: &mut Ctx) {
        self.secjoin.joined = true;
        ctx.cancel(self.id, Timer::JoinRetry);
        ctx.log(self.id, LogEvent::SecjoinJoined {});
        self.rpl_start(ctx);
        self.app_on_parent(ctx);
    }

    fn secjoin_send_request(&mut self, ctx: &mut Ctx) {
        ctx.schedule_in_secs(self.id, Timer::JoinRetry, JOIN_TIMEOUT_S);
        let Some(proxy) = self.tsch.clock_source else {
            return;
        };
        let net = NetHeader::new(self.eui64.link_local(), proxy.link_local(), JOIN_LENGTH);
        let request = Packet::network(ctx.new_uid(), PacketType::JoinRequest, self.eui64, net, Payload::JoinRequest {
            pledge: self.eui64,
        });
        self.sixlowpan_send(ctx, request);
    }

    pub(crate) fn on_join_retry(&mut self, ctx: &mut Ctx) {
        if self.secjoin.joined {
            return;
        }
        self.secjoin.retries += 1;
        if self.secjoin.retries > ctx.settings.secjoin_max_retries {
            ctx.log(self.id, LogEvent::SecjoinFailed {});
            self.tsch_desync(ctx);
            return;
        }
        self.secjoin_send_request(ctx);
    }

    pub(crate) fn secjoin_on_request(&mut self, ctx: &mut Ctx, packet: Packet) {
        let Payload::JoinRequest { pledge } = packet.payload else {
            return;
        };
        if !self.secjoin.joined {
            ctx.log(self.id, LogEvent::SecjoinDrop { packet: packet.info(), reason: DropReason::NotJoined });
            return;
        }
        if self.is_root {
            // JRC: answer the pledge directly, or through the proxy.
            let dst = if packet.mac.src == pledge {
                pledge.link_local()
            } else {
                match packet.net.as_ref() {
                    Some(n) => n.src,
                    None => return,
                }
            };
            let src = if ts_core::is_link_local(dst) { self.eui64.link_local() } else { self.eui64.global() };
            let response = Packet::network(
                ctx.new_uid(),
                PacketType::JoinResponse,
                self.eui64,
                NetHeader::new(src, dst, JOIN_LENGTH),
                Payload::JoinResponse { pledge },
            );
            self.sixlowpan_send(ctx, response);
            return;
        }
        let net = NetHeader::new(self.eui64.global(), ctx.net.root_global(), JOIN_LENGTH);
        if self.rpl_preferred_parent().is_none() {
            ctx.log(self.id, LogEvent::SecjoinDrop { packet: packet.info(), reason: DropReason::NoParent });
            return;
        }
        let relayed = Packet::network(ctx.new_uid(), PacketType::JoinRequest, self.eui64, net, Payload::JoinRequest {
            pledge,
        });
        self.sixlowpan_send(ctx, relayed);
    }

    pub(crate) fn secjoin_on_response(&mut self, ctx: &mut Ctx, packet: Packet) {
        let Payload::JoinResponse { pledge } = packet.payload else {
            return;
        };
        if pledge == self.eui64 {
            if !self.secjoin.joined {
                self.secjoin_set_joined(ctx);
            }
            return;
        }
        let net = NetHeader::new(self.eui64.link_local(), pledge.link_local(), JOIN_LENGTH);
        let relayed = Packet::network(ctx.new_uid(), PacketType::JoinResponse, self.eui64, net, Payload::JoinResponse {
            pledge,
        });
        self.sixlowpan_send(ctx, relayed);
    }

    pub(crate) fn secjoin_reset(&mut self, ctx: &mut Ctx) {
        ctx.cancel(self.id, Timer::JoinRetry);
        if self.secjoin.joined {
            ctx.log(self.id, LogEvent::SecjoinUnjoined {});
        }
        self.secjoin = Secjoin::default();
    }
}
