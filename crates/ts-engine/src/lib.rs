//! `ts-engine` — the discrete-event engine.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                    |
//! |---------------|-------------------------------------------------------------|
//! | [`queue`]     | `IntraSlotOrder`, `EventQueue<T>` (ordered map + tag index) |
//! | [`engine`]    | `Engine<T>` run loop, `EngineState`, `RunOutcome`           |
//! | [`control`]   | `ControlHandle` (pause/resume/abort from another thread)    |
//! | [`error`]     | `EngineError`, `EngineResult<T>`                            |
//!
//! # Event model (summary)
//!
//! An event is a *tag* scheduled at an `(asn, intra_slot_order)` point.
//! The tag both identifies the event (for cancellation and replacement) and
//! tells the handler what to do, so there are no stored closures:
//!
//! ```text
//! key   = (asn, intra_slot_order, insertion_seq)     ordered, unique
//! index = tag → key                                   O(1) lookup, O(log N) cancel
//! ```
//!
//! Events at the same `(asn, order)` fire in insertion order.  Rescheduling
//! a tag that is already pending replaces the pending event.

pub mod control;
pub mod engine;
pub mod error;
pub mod queue;

#[cfg(test)]
mod tests;

pub use control::ControlHandle;
pub use engine::{Engine, EngineState, RunOutcome};
pub use error::{EngineError, EngineResult};
pub use queue::{EventQueue, IntraSlotOrder};
