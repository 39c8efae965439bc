//! Fluent builder for a [`Sim`].

use ts_connectivity::{Connectivity, ConnectivityModel};
use ts_core::{Asn, MoteId, Settings, SimRng};
use ts_engine::Engine;
use ts_stack::{Mote, NetworkInfo};

use crate::world::{Env, World};
use crate::{Sim, SimError, SimResult};

/// Builds a [`Sim`] from validated settings.
///
/// | Method                     | Default                                  |
/// |----------------------------|------------------------------------------|
/// | `.connectivity_model(m)`   | the model named by `conn_class`          |
///
/// ```rust,ignore
/// let mut sim = SimBuilder::new(settings).build()?;
/// let mut log = MemoryLog::new();
/// sim.run(&mut log)?;
/// ```
pub struct SimBuilder {
    settings: Settings,
    model:    Option<Box<dyn ConnectivityModel>>,
}

impl SimBuilder {
    pub fn new(settings: Settings) -> Self {
        SimBuilder { settings, model: None }
    }

    /// Use `model` instead of the one `conn_class` names.
    pub fn connectivity_model(mut self, model: Box<dyn ConnectivityModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Validate the settings, initialize the connectivity model and create
    /// the motes.  Every configuration problem surfaces here.
    pub fn build(self) -> SimResult<Sim> {
        let settings = self.settings;
        settings.validate()?;
        if settings.exec_num_motes == 0 {
            return Err(SimError::Config("exec_numMotes must be at least 1".into()));
        }

        let mut rng = SimRng::new(settings.exec_random_seed);
        let connectivity = match self.model {
            Some(model) => Connectivity::with_model(&settings, model, &mut rng)?,
            None => Connectivity::from_settings(&settings, &mut rng)?,
        };

        let eui64s = settings.mote_eui64s();
        let motes: Vec<Mote> = eui64s
            .iter()
            .enumerate()
            .map(|(i, &eui)| Mote::new(MoteId(i as u32), eui, &settings, &mut rng))
            .collect();

        let end = Asn(settings.total_slots());
        tracing::debug!(
            motes = motes.len(),
            connectivity = connectivity.model_name(),
            %end,
            "simulation built"
        );

        Ok(Sim {
            engine:   Engine::new(end),
            world:    World {
                motes,
                connectivity,
                env: Env::new(settings, NetworkInfo::new(eui64s), rng),
            },
            started:  false,
            finished: false,
        })
    }
}
