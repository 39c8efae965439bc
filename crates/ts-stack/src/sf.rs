//! Scheduling-function dispatch.
//!
//! The configured SF is a closed set, so the mote holds an enum rather than
//! a trait object; every hook below forwards to MSF or does nothing.

use ts_core::{Eui64, SfClass, Settings};

use crate::msf::Msf;
use crate::sixp::{SixpCommand, SixpOutcome};
use crate::slotframe::Cell;
use crate::{Ctx, Mote};

/// SFID of SFNone (not allocated by IANA).
pub const SFID_NONE: u8 = 0xff;

#[derive(Debug)]
pub enum Sf {
    Msf(Msf),
    None,
}

impl Sf {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.sf_class {
            SfClass::Msf => Sf::Msf(Msf::default()),
            SfClass::SfNone => Sf::None,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Sf::Msf(_) => crate::msf::SFID_MSF,
            Sf::None => SFID_NONE,
        }
    }

    pub fn msf(&self) -> Option<&Msf> {
        match self {
            Sf::Msf(m) => Some(m),
            Sf::None => None,
        }
    }
}

impl Mote {
    pub fn sf_id(&self) -> u8 {
        self.sf.id()
    }

    fn is_msf(&self) -> bool {
        matches!(self.sf, Sf::Msf(_))
    }

    pub(crate) fn sf_on_sync(&mut self, ctx: &mut Ctx) {
        if self.is_msf() {
            self.msf_start(ctx);
        }
    }

    pub(crate) fn sf_reset(&mut self, ctx: &mut Ctx) {
        if self.is_msf() {
            self.msf_stop(ctx);
        }
    }

    /// Called once per active slot with the TX cell chosen for it.
    pub(crate) fn sf_on_slot(&mut self, ctx: &mut Ctx, used: Option<(u8, &Cell)>) {
        if self.is_msf() {
            self.msf_count_slot(ctx, used);
        }
    }

    pub(crate) fn sf_on_frame_enqueued(&mut self, ctx: &mut Ctx, dst: Eui64) {
        if self.is_msf() {
            self.msf_on_frame_enqueued(ctx, dst);
        }
    }

    pub(crate) fn sf_on_tx_done(&mut self, ctx: &mut Ctx, dst: Eui64) {
        if self.is_msf() {
            self.msf_on_tx_done(ctx, dst);
        }
    }

    pub(crate) fn sf_on_parent_change(&mut self, ctx: &mut Ctx, old: Option<Eui64>, new: Option<Eui64>) {
        if self.is_msf() {
            self.msf_on_parent_change(ctx, old, new);
        }
    }

    /// A parent was installed without negotiation (forced initial state).
    pub(crate) fn sf_on_forced_parent(&mut self, ctx: &mut Ctx, parent: Eui64) {
        if self.is_msf() {
            self.msf_add_parent_cell(ctx, parent);
        }
    }

    pub(crate) fn sf_on_sixp_result(&mut self, ctx: &mut Ctx, peer: Eui64, cmd: SixpCommand, outcome: SixpOutcome) {
        if self.is_msf() {
            self.msf_on_sixp_result(ctx, peer, cmd, outcome);
        }
    }
}
