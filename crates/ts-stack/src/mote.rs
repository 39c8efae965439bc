//! The mote: one protocol stack, its layers as fields.
//!
//! Each layer's behaviour lives in its own module as an `impl Mote` block,
//! so layers can call each other directly while their state stays separate.

use ts_core::{Eui64, LogEvent, MoteId, Settings, SimRng};

use crate::app::App;
use crate::clock::Clock;
use crate::radio::Radio;
use crate::rpl::Rpl;
use crate::secjoin::Secjoin;
use crate::sf::Sf;
use crate::sixlowpan::Sixlowpan;
use crate::sixp::Sixp;
use crate::tsch::Tsch;
use crate::{Ctx, Timer};

#[derive(Debug)]
pub struct Mote {
    pub id:        MoteId,
    pub eui64:     Eui64,
    pub is_root:   bool,
    pub radio:     Radio,
    pub tsch:      Tsch,
    pub sixlowpan: Sixlowpan,
    pub sixp:      Sixp,
    pub sf:        Sf,
    pub rpl:       Rpl,
    pub secjoin:   Secjoin,
    pub app:       App,
}

impl Mote {
    /// A powered-off mote.  Non-root clocks draw their drift from `rng`.
    pub fn new(id: MoteId, eui64: Eui64, settings: &Settings, rng: &mut SimRng) -> Self {
        let is_root = id.is_root();
        let clock = if is_root {
            Clock::reference()
        } else {
            Clock::drifting(settings.tsch_clock_max_drift_ppm, rng)
        };
        Mote {
            id,
            eui64,
            is_root,
            radio: Radio::default(),
            tsch: Tsch::new(settings, clock),
            sixlowpan: Sixlowpan::default(),
            sixp: Sixp::default(),
            sf: Sf::from_settings(settings),
            rpl: Rpl::new(settings),
            secjoin: Secjoin::default(),
            app: App::default(),
        }
    }

    /// Power on.  The root starts synchronized and joined; everyone else
    /// starts scanning for EBs.
    pub fn boot(&mut self, ctx: &mut Ctx) {
        self.schedule_radio_stats(ctx);
        if self.is_root {
            self.tsch_start_root(ctx);
            self.secjoin_set_joined(ctx);
        } else {
            self.tsch_schedule_next_active(ctx);
        }
    }

    /// Dispatch one of this mote's timers.
    pub fn on_timer(&mut self, ctx: &mut Ctx, timer: Timer) {
        match timer {
            Timer::ActiveCell => self.on_active_cell(ctx),
            Timer::EbWaitEnd => self.on_eb_wait_end(ctx),
            Timer::KeepAlive => self.on_keep_alive(ctx),
            Timer::SyncWatchdog => self.on_sync_watchdog(ctx),
            Timer::ReassemblyExpiry { src, tag } => self.on_reassembly_expiry(ctx, src, tag),
            Timer::VrbExpiry { src, tag } => self.on_vrb_expiry(ctx, src, tag),
            Timer::SixpTimeout { peer } => self.on_sixp_timeout(ctx, peer),
            Timer::MsfHousekeeping => self.on_msf_housekeeping(ctx),
            Timer::MsfRetry => self.on_msf_retry(ctx),
            Timer::TrickleTransmit => self.on_trickle_transmit(ctx),
            Timer::TrickleIntervalEnd => self.on_trickle_interval_end(ctx),
            Timer::Dao => self.on_dao_timer(ctx),
            Timer::Dis => self.on_dis_timer(ctx),
            Timer::JoinRetry => self.on_join_retry(ctx),
            Timer::AppTx => self.on_app_tx(ctx),
            Timer::RadioStats => self.on_radio_stats_timer(ctx),
        }
    }

    pub fn is_sync(&self) -> bool {
        self.tsch.is_sync
    }

    /// Put this mote straight into the synchronized, joined state (forced
    /// initial state).  The time source is set when the parent is.
    pub fn force_sync_and_join(&mut self, ctx: &mut Ctx, time_source: Option<Eui64>) {
        if self.is_root {
            return;
        }
        self.tsch.eb_candidates_clear();
        ctx.cancel(self.id, Timer::EbWaitEnd);
        self.tsch.is_sync = true;
        self.tsch.clock_source = time_source;
        if let Some(source) = time_source {
            ctx.log(self.id, LogEvent::TschSynced { clock_source: source });
        }
        self.tsch_install_minimal(ctx);
        self.sf_on_sync(ctx);
        self.secjoin.joined = true;
        ctx.log(self.id, LogEvent::SecjoinJoined {});
        self.tsch_arm_timers(ctx);
        self.tsch_schedule_next_active(ctx);
    }
}
