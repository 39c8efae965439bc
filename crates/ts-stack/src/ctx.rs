//! The per-event run context and the timer tags.
//!
//! Every handler receives a [`Ctx`] borrowing the pieces of the run it may
//! touch: the event queue, the RNG, the log sink and read-only network
//! facts.  There is no process-wide state; two `Sim`s can run side by side.

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use ts_core::{Asn, Eui64, LogEvent, LogRecord, LogSink, MoteId, Settings, SimRng};
use ts_engine::{EventQueue, IntraSlotOrder};

// ── Tags ──────────────────────────────────────────────────────────────────────

/// Per-mote timers.  A `(MoteId, Timer)` pair is unique in the queue, so
/// re-arming a timer replaces its previous deadline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Timer {
    /// The next slot with something to do (TX, RX, or EB scan).
    ActiveCell,
    /// End of the EB collection window of an unsynchronized mote.
    EbWaitEnd,
    KeepAlive,
    /// Desynchronize if the time source stays silent until this fires.
    SyncWatchdog,
    ReassemblyExpiry { src: Eui64, tag: u16 },
    VrbExpiry { src: Eui64, tag: u16 },
    SixpTimeout { peer: Eui64 },
    MsfHousekeeping,
    MsfRetry,
    TrickleTransmit,
    TrickleIntervalEnd,
    Dao,
    Dis,
    JoinRetry,
    AppTx,
    RadioStats,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventTag {
    /// Resolve every transmission of the current slot.
    Propagate,
    /// Apply the next batch of trace-driven link changes.
    ConnectivityUpdate,
    Mote(MoteId, Timer),
}

// ── NetworkInfo ───────────────────────────────────────────────────────────────

/// Immutable facts about the network every mote may consult.
#[derive(Clone, Debug)]
pub struct NetworkInfo {
    eui64s: Vec<Eui64>,
    by_eui: BTreeMap<Eui64, MoteId>,
}

impl NetworkInfo {
    pub fn new(eui64s: Vec<Eui64>) -> Self {
        let by_eui = eui64s
            .iter()
            .enumerate()
            .map(|(i, &e)| (e, MoteId(i as u32)))
            .collect();
        NetworkInfo { eui64s, by_eui }
    }

    pub fn num_motes(&self) -> usize {
        self.eui64s.len()
    }

    pub fn mote_of(&self, eui: Eui64) -> Option<MoteId> {
        self.by_eui.get(&eui).copied()
    }

    pub fn eui_of(&self, id: MoteId) -> Eui64 {
        self.eui64s.get(id.index()).copied().unwrap_or(Eui64::BROADCAST)
    }

    pub fn root_eui(&self) -> Eui64 {
        self.eui_of(MoteId::ROOT)
    }

    /// Global address of the DAG root (and JRC).
    pub fn root_global(&self) -> Ipv6Addr {
        self.root_eui().global()
    }
}

// ── Ctx ───────────────────────────────────────────────────────────────────────

pub struct Ctx<'a> {
    pub asn:      Asn,
    pub settings: &'a Settings,
    pub queue:    &'a mut EventQueue<EventTag>,
    pub rng:      &'a mut SimRng,
    pub log:      &'a mut dyn LogSink,
    pub net:      &'a NetworkInfo,
    pub next_uid: &'a mut u64,
}

impl Ctx<'_> {
    /// Arm `timer` for `mote` at an absolute ASN.
    pub fn schedule(&mut self, mote: MoteId, timer: Timer, asn: Asn, order: IntraSlotOrder) {
        self.queue.schedule_at(asn, order, EventTag::Mote(mote, timer));
    }

    /// Arm a stack-task timer `slots` from now (at least one slot ahead).
    pub fn schedule_in(&mut self, mote: MoteId, timer: Timer, slots: u64) {
        let asn = self.asn + slots.max(1);
        self.schedule(mote, timer, asn, IntraSlotOrder::StackTasks);
    }

    /// Arm a stack-task timer `secs` seconds from now.
    pub fn schedule_in_secs(&mut self, mote: MoteId, timer: Timer, secs: f64) {
        let slots = self.slots_for(secs);
        self.schedule_in(mote, timer, slots);
    }

    pub fn cancel(&mut self, mote: MoteId, timer: Timer) -> bool {
        self.queue.cancel(&EventTag::Mote(mote, timer))
    }

    pub fn is_scheduled(&self, mote: MoteId, timer: Timer) -> bool {
        self.queue.is_scheduled(&EventTag::Mote(mote, timer))
    }

    /// Make sure this slot's transmissions get resolved.
    pub fn request_propagation(&mut self) {
        if !self.queue.is_scheduled(&EventTag::Propagate) {
            self.queue.schedule_at(self.asn, IntraSlotOrder::Propagate, EventTag::Propagate);
        }
    }

    pub fn log(&mut self, mote: MoteId, event: LogEvent) {
        self.log.log(LogRecord::new(self.asn, Some(mote), event));
    }

    #[inline]
    pub fn now_s(&self) -> f64 {
        self.settings.slot_clock().seconds_at(self.asn)
    }

    #[inline]
    pub fn slots_for(&self, secs: f64) -> u64 {
        self.settings.slot_clock().slots_for(secs)
    }

    pub fn new_uid(&mut self) -> u64 {
        *self.next_uid += 1;
        *self.next_uid
    }

    /// Physical channel of a cell with `channel_offset` at the current ASN.
    pub fn channel_for(&self, channel_offset: u8) -> u8 {
        let seq = &self.settings.tsch_hopping_sequence;
        let i = (self.asn.0 + channel_offset as u64) % seq.len() as u64;
        seq[i as usize]
    }
}
