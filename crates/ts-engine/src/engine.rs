//! The `Engine` run loop.

use std::hash::Hash;

use ts_core::Asn;

use crate::{ControlHandle, EngineError, EventQueue, IntraSlotOrder};

/// Lifecycle of one engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    Running,
    Paused,
    Finished,
    Aborted,
    /// A handler returned an error; the run cannot continue.
    Failed,
}

/// Why [`Engine::run`] returned control.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Reached the terminal ASN.
    Finished,
    /// Stopped at the given ASN, either at a `pause_at` point or because the
    /// control handle asked for a pause.  Call [`Engine::play`] then `run`
    /// again to continue.
    Paused(Asn),
    Aborted,
}

/// Single-threaded discrete-event engine.
///
/// Holds the event queue and the run bounds.  The simulated world is *not*
/// owned by the engine: the caller passes a handler to [`run`](Self::run)
/// which receives the queue, the current ASN and the fired tag, so the
/// world and the queue can be borrowed mutably at the same time.
pub struct Engine<T> {
    pub queue: EventQueue<T>,
    current_asn: Asn,
    end_asn:     Asn,
    pause_at:    Option<Asn>,
    state:       EngineState,
    control:     ControlHandle,
}

impl<T: Clone + Eq + Hash> Engine<T> {
    /// An engine that runs until `end_asn` (exclusive).
    pub fn new(end_asn: Asn) -> Self {
        Engine {
            queue:       EventQueue::new(),
            current_asn: Asn::ZERO,
            end_asn,
            pause_at:    None,
            state:       EngineState::Ready,
            control:     ControlHandle::new(),
        }
    }

    /// Convenience forwarder to [`EventQueue::schedule_at`].
    pub fn schedule_at(&mut self, asn: Asn, order: IntraSlotOrder, tag: T) {
        self.queue.schedule_at(asn, order, tag);
    }

    pub fn cancel(&mut self, tag: &T) -> bool {
        self.queue.cancel(tag)
    }

    #[inline]
    pub fn current_asn(&self) -> Asn {
        self.current_asn
    }

    #[inline]
    pub fn end_asn(&self) -> Asn {
        self.end_asn
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// A handle other threads may use to pause, resume or abort this run.
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Return from `run` before any event at `asn` or later fires.
    pub fn pause_at(&mut self, asn: Asn) -> Result<(), EngineError> {
        if asn < self.current_asn {
            return Err(EngineError::PauseInThePast { pause: asn, now: self.current_asn });
        }
        self.pause_at = Some(asn);
        Ok(())
    }

    /// Clear a pause so the next `run` continues.
    pub fn play(&mut self) {
        self.control.resume();
        if self.state == EngineState::Paused {
            self.state = EngineState::Ready;
        }
    }

    /// Stop the run; a later `run` returns `Aborted` immediately.
    pub fn abort(&mut self) {
        self.control.abort();
    }

    /// Fire events in order until the terminal ASN, a pause point or an abort.
    ///
    /// A handler error marks the engine `Failed` and is returned unchanged.
    pub fn run<E, F>(&mut self, mut handler: F) -> Result<RunOutcome, E>
    where
        E: From<EngineError>,
        F: FnMut(&mut EventQueue<T>, Asn, T) -> Result<(), E>,
    {
        match self.state {
            EngineState::Ready | EngineState::Paused | EngineState::Running => {}
            other => return Err(EngineError::NotRunnable(other).into()),
        }
        self.state = EngineState::Running;
        // Control is checked once per slot, before its first event fires.
        let mut checked: Option<Asn> = None;

        loop {
            let next_asn = match self.queue.peek() {
                Some((asn, _)) if asn < self.end_asn => Some(asn),
                _ => None,
            };
            let slot = next_asn.unwrap_or(self.end_asn);

            if checked != Some(slot) {
                if self.control.is_aborted() {
                    self.state = EngineState::Aborted;
                    tracing::info!(asn = %self.current_asn, "run aborted");
                    return Ok(RunOutcome::Aborted);
                }
                if self.control.is_paused() {
                    self.state = EngineState::Paused;
                    return Ok(RunOutcome::Paused(self.current_asn));
                }
                if let Some(p) = self.pause_at.filter(|p| *p <= slot && *p < self.end_asn) {
                    self.pause_at = None;
                    self.current_asn = p;
                    self.state = EngineState::Paused;
                    return Ok(RunOutcome::Paused(p));
                }
                checked = Some(slot);
            }

            let Some(asn) = next_asn else {
                self.current_asn = self.end_asn;
                self.state = EngineState::Finished;
                return Ok(RunOutcome::Finished);
            };
            self.current_asn = asn;

            let Some((asn, _order, tag)) = self.queue.pop_next() else {
                continue;
            };
            if let Err(e) = handler(&mut self.queue, asn, tag) {
                self.state = EngineState::Failed;
                tracing::error!(%asn, "event handler failed; run marked failed");
                return Err(e);
            }
        }
    }
}
