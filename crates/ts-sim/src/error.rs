use thiserror::Error;

use ts_connectivity::ConnectivityError;
use ts_core::{MoteId, TsError};
use ts_engine::EngineError;
use ts_stack::StackError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Settings(#[from] TsError),

    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("event for unknown mote {0}")]
    UnknownMote(MoteId),
}

pub type SimResult<T> = Result<T, SimError>;
