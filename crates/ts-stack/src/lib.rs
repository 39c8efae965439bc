//! `ts-stack` — the per-mote 6TiSCH protocol stack.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                   |
//! |-----------------|------------------------------------------------------------|
//! | [`packet`]      | `Packet`, `PacketType`, MAC / IPv6 headers, payloads       |
//! | [`ctx`]         | `Ctx` (per-event run context), `Timer`, `EventTag`         |
//! | [`mote`]        | `Mote`: layer state and timer dispatch                     |
//! | [`radio`]       | radio state and energy counters                            |
//! | [`clock`]       | drifting mote clocks                                       |
//! | [`slotframe`]   | `Cell`, `CellOptions`, `Slotframe`                         |
//! | [`txqueue`]     | the TSCH transmit queue                                    |
//! | [`tsch`]        | per-slot action, retries, backoff, synchronization         |
//! | [`sixlowpan`]   | routing to the next hop, fragmentation, VRB forwarding     |
//! | [`sixp`]        | 6P transactions                                            |
//! | [`sf`], [`msf`] | scheduling functions (MSF, SFNone)                         |
//! | [`rpl`]         | DIO / DIS / DAO, source routing                            |
//! | [`of`]          | objective functions (OF0, OFBestLinkPDR), parent set       |
//! | [`trickle`]     | RFC 6206 Trickle timer                                     |
//! | [`secjoin`]     | join exchange and stateless join proxy                     |
//! | [`app`]         | DATA traffic toward the root                               |
//! | [`error`]       | `StackError`, `StackResult<T>`                             |
//!
//! # Layer interaction
//!
//! Layers are `impl Mote` blocks calling each other directly.  Anything
//! that happens later is a [`Timer`] armed through the [`Ctx`]; the
//! simulation loop hands it back to [`Mote::on_timer`].  Frames on the air
//! are resolved outside the mote: the simulation collects every mote's
//! [`tsch::ActiveSlot`] and radio state, runs propagation, and calls
//! [`Mote::tsch_tx_done`] / [`Mote::tsch_rx_done`].

pub mod app;
pub mod clock;
pub mod ctx;
pub mod error;
pub mod mote;
pub mod msf;
pub mod of;
pub mod packet;
pub mod radio;
pub mod rpl;
pub mod secjoin;
pub mod sf;
pub mod sixlowpan;
pub mod sixp;
pub mod slotframe;
pub mod trickle;
pub mod tsch;
pub mod txqueue;


pub use ctx::{Ctx, EventTag, NetworkInfo, Timer};
pub use error::{StackError, StackResult};
pub use mote::Mote;
pub use packet::{FragInfo, MacHeader, NetHeader, Packet, PacketType, Payload};
pub use radio::{Radio, RadioState, RadioStats};
pub use slotframe::{Cell, CellOptions, LinkType, Slotframe};
pub use tsch::{ActiveSlot, RxFrame};
