//! Structured simulation event log.
//!
//! Every observable protocol event is a [`LogEvent`] variant.  A
//! [`LogRecord`] stamps it with the ASN and the mote that produced it and
//! serializes to one JSONL line:
//!
//! ```text
//! {"_asn":1234,"_mote_id":3,"_type":"tsch.txdone","packet":{...},...}
//! ```
//!
//! Records are handed to a [`LogSink`]; the simulator never formats or
//! writes them itself.

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use crate::{Asn, Eui64, MoteId, Settings};

// ── Drop reasons ──────────────────────────────────────────────────────────────

/// Closed set of reasons a packet may be discarded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoRoute,
    QueueFull,
    MaxRetries,
    ReassemblyTimeout,
    VrbTimeout,
    NotJoined,
    NoParent,
}

// ── Packet summary ────────────────────────────────────────────────────────────

/// Summary of a packet as it appears in log records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PacketInfo {
    pub uid: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub mac_src: Option<Eui64>,
    pub mac_dst: Option<Eui64>,
    pub net_src: Option<Ipv6Addr>,
    pub net_dst: Option<Ipv6Addr>,
    pub length: u32,
}

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum LogEvent {
    #[serde(rename = "config")]
    Config { settings: Box<Settings> },
    #[serde(rename = "sim.end")]
    SimEnd { num_motes: u32 },

    #[serde(rename = "tsch.synced")]
    TschSynced { clock_source: Eui64 },
    #[serde(rename = "tsch.desynced")]
    TschDesynced {},
    #[serde(rename = "tsch.add_slotframe")]
    TschAddSlotframe { handle: u8, length: u32 },
    #[serde(rename = "tsch.add_cell")]
    TschAddCell {
        handle:         u8,
        slot_offset:    u32,
        channel_offset: u8,
        neighbor:       Option<Eui64>,
        cell_options:   Vec<String>,
        link_type:      String,
    },
    #[serde(rename = "tsch.delete_cell")]
    TschDeleteCell {
        handle:         u8,
        slot_offset:    u32,
        channel_offset: u8,
        neighbor:       Option<Eui64>,
        cell_options:   Vec<String>,
        link_type:      String,
    },
    #[serde(rename = "tsch.txdone")]
    TschTxDone {
        packet:         PacketInfo,
        channel:        u8,
        /// `None` for frames sent opportunistically under the pending bit.
        slot_offset:    Option<u32>,
        channel_offset: Option<u8>,
        is_acked:       bool,
        retries_left:   u32,
    },
    #[serde(rename = "tsch.be.updated")]
    TschBeUpdated { old_be: u8, new_be: u8 },
    #[serde(rename = "tsch.drop")]
    TschDrop { packet: PacketInfo, reason: DropReason },

    #[serde(rename = "sixlowpan.drop")]
    SixlowpanDrop { packet: PacketInfo, reason: DropReason },

    #[serde(rename = "sixp.tx")]
    SixpTx { packet: PacketInfo, msg_type: String, code: String, seqnum: u8 },
    #[serde(rename = "sixp.rx")]
    SixpRx { packet: PacketInfo, msg_type: String, code: String, seqnum: u8 },
    #[serde(rename = "sixp.comp")]
    SixpComp { peer: Eui64, cmd: String, seqnum: u8 },
    #[serde(rename = "sixp.timeout")]
    SixpTimeout { peer: Eui64, cmd: String, seqnum: u8 },
    #[serde(rename = "sixp.error")]
    SixpError { peer: Eui64, error: String, seqnum: u8 },

    #[serde(rename = "msf.tx_cell_utilization")]
    MsfTxCellUtilization { neighbor: Eui64, num_cells_elapsed: u32, num_cells_used: u32 },
    #[serde(rename = "msf.error.schedule_full")]
    MsfErrorScheduleFull { neighbor: Eui64 },

    #[serde(rename = "rpl.churn")]
    RplChurn { rank: Option<u16>, old_parent: Option<Eui64>, new_parent: Option<Eui64> },
    #[serde(rename = "rpl.dio.tx")]
    RplDioTx { packet: PacketInfo, rank: u16 },
    #[serde(rename = "rpl.dao.rx")]
    RplDaoRx { child: Ipv6Addr, parent: Ipv6Addr },
    #[serde(rename = "rpl.drop")]
    RplDrop { packet: PacketInfo, reason: DropReason },

    #[serde(rename = "secjoin.joined")]
    SecjoinJoined {},
    #[serde(rename = "secjoin.unjoined")]
    SecjoinUnjoined {},
    #[serde(rename = "secjoin.failed")]
    SecjoinFailed {},
    #[serde(rename = "secjoin.drop")]
    SecjoinDrop { packet: PacketInfo, reason: DropReason },

    #[serde(rename = "app.tx")]
    AppTx { packet: PacketInfo },
    #[serde(rename = "app.rx")]
    AppRx { packet: PacketInfo },
    #[serde(rename = "app.drop")]
    AppDrop { packet: PacketInfo, reason: DropReason },

    #[serde(rename = "radio.stats")]
    RadioStats { tx: u64, rx: u64, idle_listen: u64, sleep: u64 },
}

impl LogEvent {
    /// The `_type` string this event serializes under.
    pub fn type_name(&self) -> &'static str {
        match self {
            LogEvent::Config { .. } => "config",
            LogEvent::SimEnd { .. } => "sim.end",
            LogEvent::TschSynced { .. } => "tsch.synced",
            LogEvent::TschDesynced { .. } => "tsch.desynced",
            LogEvent::TschAddSlotframe { .. } => "tsch.add_slotframe",
            LogEvent::TschAddCell { .. } => "tsch.add_cell",
            LogEvent::TschDeleteCell { .. } => "tsch.delete_cell",
            LogEvent::TschTxDone { .. } => "tsch.txdone",
            LogEvent::TschBeUpdated { .. } => "tsch.be.updated",
            LogEvent::TschDrop { .. } => "tsch.drop",
            LogEvent::SixlowpanDrop { .. } => "sixlowpan.drop",
            LogEvent::SixpTx { .. } => "sixp.tx",
            LogEvent::SixpRx { .. } => "sixp.rx",
            LogEvent::SixpComp { .. } => "sixp.comp",
            LogEvent::SixpTimeout { .. } => "sixp.timeout",
            LogEvent::SixpError { .. } => "sixp.error",
            LogEvent::MsfTxCellUtilization { .. } => "msf.tx_cell_utilization",
            LogEvent::MsfErrorScheduleFull { .. } => "msf.error.schedule_full",
            LogEvent::RplChurn { .. } => "rpl.churn",
            LogEvent::RplDioTx { .. } => "rpl.dio.tx",
            LogEvent::RplDaoRx { .. } => "rpl.dao.rx",
            LogEvent::RplDrop { .. } => "rpl.drop",
            LogEvent::SecjoinJoined { .. } => "secjoin.joined",
            LogEvent::SecjoinUnjoined { .. } => "secjoin.unjoined",
            LogEvent::SecjoinFailed { .. } => "secjoin.failed",
            LogEvent::SecjoinDrop { .. } => "secjoin.drop",
            LogEvent::AppTx { .. } => "app.tx",
            LogEvent::AppRx { .. } => "app.rx",
            LogEvent::AppDrop { .. } => "app.drop",
            LogEvent::RadioStats { .. } => "radio.stats",
        }
    }

    /// Every event type name, in declaration order.
    pub const ALL_TYPES: &'static [&'static str] = &[
        "config", "sim.end",
        "tsch.synced", "tsch.desynced", "tsch.add_slotframe", "tsch.add_cell",
        "tsch.delete_cell", "tsch.txdone", "tsch.be.updated", "tsch.drop",
        "sixlowpan.drop",
        "sixp.tx", "sixp.rx", "sixp.comp", "sixp.timeout", "sixp.error",
        "msf.tx_cell_utilization", "msf.error.schedule_full",
        "rpl.churn", "rpl.dio.tx", "rpl.dao.rx", "rpl.drop",
        "secjoin.joined", "secjoin.unjoined", "secjoin.failed", "secjoin.drop",
        "app.tx", "app.rx", "app.drop",
        "radio.stats",
    ];
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "_asn")]
    pub asn: Asn,
    #[serde(rename = "_mote_id", default, skip_serializing_if = "Option::is_none")]
    pub mote_id: Option<MoteId>,
    #[serde(flatten)]
    pub event: LogEvent,
}

impl LogRecord {
    pub fn new(asn: Asn, mote_id: Option<MoteId>, event: LogEvent) -> Self {
        LogRecord { asn, mote_id, event }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.event.type_name()
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Receives every record produced by a run, in order.
pub trait LogSink {
    fn log(&mut self, record: LogRecord);
}

/// Discards everything.
pub struct NullLog;

impl LogSink for NullLog {
    fn log(&mut self, _record: LogRecord) {}
}

/// Keeps every record in memory.  Used by tests and by the front-end to
/// replay a run.
#[derive(Default, Debug)]
pub struct MemoryLog {
    pub records: Vec<LogRecord>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a LogRecord> + 'a {
        self.records.iter().filter(move |r| r.type_name() == type_name)
    }

    pub fn count(&self, type_name: &str) -> usize {
        self.of_type(type_name).count()
    }

    pub fn of_mote(&self, mote: MoteId) -> impl Iterator<Item = &LogRecord> + '_ {
        self.records.iter().filter(move |r| r.mote_id == Some(mote))
    }
}

impl LogSink for MemoryLog {
    fn log(&mut self, record: LogRecord) {
        self.records.push(record);
    }
}
