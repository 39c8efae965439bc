//! The `Sim` struct: an engine driving a world.

use ts_connectivity::Connectivity;
use ts_core::{Asn, LogSink, MoteId, Settings};
use ts_engine::{ControlHandle, Engine, EngineState, RunOutcome};
use ts_stack::{Ctx, EventTag, Mote};

use crate::world::World;
use crate::{SimError, SimObserver, SimResult};

/// One simulation run.
///
/// The first call to [`run`](Self::run) logs the `config` record and boots
/// every mote at ASN 0; later calls continue where a pause left off.  When
/// the terminal ASN is reached the final `radio.stats` records and
/// `sim.end` are logged and further calls return `Finished` immediately.
///
/// Create via [`SimBuilder`][crate::SimBuilder].
pub struct Sim {
    pub(crate) engine:   Engine<EventTag>,
    pub(crate) world:    World,
    pub(crate) started:  bool,
    pub(crate) finished: bool,
}

impl Sim {
    /// Run until the terminal ASN, a pause point or an abort.
    pub fn run<O: SimObserver>(&mut self, observer: &mut O) -> SimResult<RunOutcome> {
        let Sim { engine, world, started, finished } = self;
        if *finished {
            return Ok(RunOutcome::Finished);
        }
        if !*started {
            tracing::info!(
                motes = world.motes.len(),
                end   = %engine.end_asn(),
                seed  = world.env.settings.exec_random_seed,
                "run started"
            );
            world.boot(&mut engine.queue, &mut *observer)?;
            observer.on_sim_start(&world.env.settings);
            *started = true;
        }

        let outcome = engine.run(|queue, asn, tag| world.handle(queue, &mut *observer, asn, tag))?;

        match outcome {
            RunOutcome::Finished => {
                let end = engine.current_asn();
                world.finish(&mut engine.queue, &mut *observer, end);
                observer.on_sim_end(end);
                *finished = true;
                tracing::info!(asn = %end, "run finished");
            }
            RunOutcome::Paused(asn) => {
                observer.on_pause(asn);
                tracing::debug!(%asn, "run paused");
            }
            RunOutcome::Aborted => {
                tracing::warn!(asn = %engine.current_asn(), "run aborted before its terminal ASN");
            }
        }
        Ok(outcome)
    }

    /// Pause before any event at `asn` or later fires.
    pub fn pause_at(&mut self, asn: Asn) -> SimResult<()> {
        Ok(self.engine.pause_at(asn)?)
    }

    pub fn play(&mut self) {
        self.engine.play();
    }

    pub fn abort(&mut self) {
        self.engine.abort();
    }

    /// A handle other threads may use to pause, resume or abort this run.
    pub fn control(&self) -> ControlHandle {
        self.engine.control()
    }

    pub fn current_asn(&self) -> Asn {
        self.engine.current_asn()
    }

    pub fn end_asn(&self) -> Asn {
        self.engine.end_asn()
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn settings(&self) -> &Settings {
        &self.world.env.settings
    }

    pub fn motes(&self) -> &[Mote] {
        &self.world.motes
    }

    pub fn mote(&self, id: MoteId) -> Option<&Mote> {
        self.world.motes.get(id.index())
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.world.connectivity
    }

    /// Mutable access to the links, e.g. to degrade one while paused.
    pub fn connectivity_mut(&mut self) -> &mut Connectivity {
        &mut self.world.connectivity
    }

    /// Run `f` on one mote at the current ASN, as if one of its own events
    /// had fired.  Meant for use while paused.
    pub fn with_mote<R>(
        &mut self,
        id:  MoteId,
        log: &mut dyn LogSink,
        f:   impl FnOnce(&mut Mote, &mut Ctx) -> R,
    ) -> SimResult<R> {
        let asn = self.engine.current_asn();
        let World { motes, env, .. } = &mut self.world;
        let mote = motes.get_mut(id.index()).ok_or(SimError::UnknownMote(id))?;
        let mut ctx = env.ctx(asn, &mut self.engine.queue, log);
        Ok(f(mote, &mut ctx))
    }
}
