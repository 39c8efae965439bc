use thiserror::Error;

use ts_core::Asn;

use crate::EngineState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine cannot run from state {0:?}")]
    NotRunnable(EngineState),

    #[error("pause point {pause} is not after the current {now}")]
    PauseInThePast { pause: Asn, now: Asn },
}

pub type EngineResult<T> = Result<T, EngineError>;
