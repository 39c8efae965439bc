//! `ts-sim` — runs a 6TiSCH network on the discrete-event engine.
//!
//! # One slot
//!
//! ```text
//! START_SLOT    every mote with a cell (or scanning) in this slot puts its
//!               radio in TX or RX and requests propagation
//! PROPAGATE     the connectivity model resolves the slot; listeners get
//!               their frame (ascending id), then transmitters their ACK
//! STACK_TASKS   protocol timers: 6P timeouts, Trickle, DAO, app traffic ...
//! ADMIN_TASKS   bookkeeping
//! ```
//!
//! Link changes from a trace fire at `START_SLOT` of the slot they apply to.
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use ts_core::{MemoryLog, Settings};
//! use ts_sim::SimBuilder;
//!
//! let mut sim = SimBuilder::new(Settings::default()).build()?;
//! let mut log = MemoryLog::new();
//! sim.run(&mut log)?;
//! ```

pub mod builder;
pub mod error;
pub mod observer;
pub mod sim;
pub mod world;

#[cfg(test)]
mod tests;

pub use builder::SimBuilder;
pub use error::{SimError, SimResult};
pub use observer::SimObserver;
pub use sim::Sim;
pub use ts_engine::{ControlHandle, EngineState, RunOutcome};
