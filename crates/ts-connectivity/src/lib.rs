//! `ts-connectivity` — who can hear whom, on which channel, and how well.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                  |
//! |-----------------|-----------------------------------------------------------|
//! | [`matrix`]      | `Link`, `ConnectivityMatrix` (dense `src × dst × channel`) |
//! | [`pister`]      | RSSI ↔ PDR table, Friis path loss, Pister-hack shift      |
//! | [`model`]       | `ConnectivityModel` trait, `FullyMeshed`, `Linear`, `RandomTopology` |
//! | [`k7`]          | `K7Trace` gzipped trace reader and replayer               |
//! | [`propagate`]   | `Transmission`, `Listener`, `propagate()` per slot        |
//! | [`error`]       | `ConnectivityError`, `ConnectivityResult<T>`              |
//!
//! [`Connectivity`] bundles a matrix with the model that fills it.

pub mod error;
pub mod k7;
pub mod matrix;
pub mod model;
pub mod pister;
pub mod propagate;

#[cfg(test)]
mod tests;

pub use error::{ConnectivityError, ConnectivityResult};
pub use k7::K7Trace;
pub use matrix::{ConnectivityMatrix, LINK_NONE, LINK_NONE_RSSI, Link};
pub use model::{ConnectivityModel, FullyMeshed, Linear, RandomTopology};
pub use propagate::{Listener, PropagationOutcome, PropagationParams, Transmission, propagate};

use ts_core::{ConnClass, Settings, SimRng};

// ── Connectivity ──────────────────────────────────────────────────────────────

/// The matrix of a run together with the model that keeps it current.
pub struct Connectivity {
    pub matrix: ConnectivityMatrix,
    model:      Box<dyn ConnectivityModel>,
}

impl Connectivity {
    /// Build and initialize the model named by `conn_class`.
    ///
    /// Configuration problems (unreadable trace, trace too short, hopping
    /// sequence not covered by the trace) are reported here, before the
    /// first slot runs.
    pub fn from_settings(settings: &Settings, rng: &mut SimRng) -> ConnectivityResult<Self> {
        let model: Box<dyn ConnectivityModel> = match settings.conn_class {
            ConnClass::FullyMeshed => Box::new(FullyMeshed),
            ConnClass::Linear => Box::new(Linear),
            ConnClass::Random => Box::new(RandomTopology::from_settings(settings)),
            ConnClass::K7 => {
                let path = settings.conn_trace.as_deref().ok_or_else(|| {
                    ConnectivityError::Config("conn_class K7 requires conn_trace".into())
                })?;
                Box::new(K7Trace::open(path, settings)?)
            }
        };
        Self::with_model(settings, model, rng)
    }

    /// Initialize an explicit model (tests use this with hand-made models).
    pub fn with_model(
        settings:  &Settings,
        mut model: Box<dyn ConnectivityModel>,
        rng:       &mut SimRng,
    ) -> ConnectivityResult<Self> {
        let mut matrix = ConnectivityMatrix::new(
            settings.exec_num_motes as usize,
            settings.tsch_hopping_sequence.clone(),
        );
        model.init(&mut matrix, rng)?;
        tracing::debug!(model = model.name(), motes = settings.exec_num_motes, "connectivity initialized");
        Ok(Connectivity { matrix, model })
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Apply model updates due at `now_s`; returns the time of the next one.
    pub fn advance(&mut self, now_s: f64) -> Option<f64> {
        self.model.advance(&mut self.matrix, now_s)
    }

    pub fn next_update_s(&self) -> Option<f64> {
        self.model.next_update_s()
    }
}
