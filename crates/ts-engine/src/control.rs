//! Cross-thread run control.
//!
//! The engine itself is single-threaded.  A host (the front-end controller)
//! holds a cloned `ControlHandle` and flips flags that the run loop checks
//! at every slot boundary.  Nothing else crosses threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Debug, Default)]
pub struct ControlHandle {
    pause: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run loop to return `Paused` at the next slot boundary.
    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    /// Ask the run loop to stop for good at the next slot boundary.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}
