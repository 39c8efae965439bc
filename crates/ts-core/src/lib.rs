//! `ts-core` — foundational types for the 6TiSCH network simulator.
//!
//! This crate is a dependency of every other `ts-*` crate.  It has no
//! `ts-*` dependencies and only a few external ones (`rand`, `thiserror`,
//! `serde`, `serde_json`).
//!
//! # What lives here
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | [`ids`]         | `MoteId`                                              |
//! | [`time`]        | `Asn`, `SlotClock`                                    |
//! | [`rng`]         | `SimRng` (the single seeded source of randomness)     |
//! | [`addr`]        | `Eui64`, IPv6 link-local / global / multicast helpers |
//! | [`settings`]    | `Settings` and its enums, defaults and validation     |
//! | [`log`]         | `LogRecord`, `LogEvent`, `DropReason`, `LogSink`      |
//! | [`error`]       | `TsError`, `TsResult`                                 |

pub mod addr;
pub mod error;
pub mod ids;
pub mod log;
pub mod rng;
pub mod settings;
pub mod time;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use addr::{ALL_RPL_NODES, Eui64, is_global, is_link_local, is_multicast};
pub use error::{TsError, TsResult};
pub use ids::MoteId;
pub use log::{DropReason, LogEvent, LogRecord, LogSink, MemoryLog, NullLog, PacketInfo};
pub use rng::SimRng;
pub use settings::{AppClass, ConnClass, Fragmentation, RplOf, SfClass, Settings};
pub use time::{Asn, SlotClock};
