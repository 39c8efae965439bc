use thiserror::Error;

use ts_core::{Eui64, TsError};

/// Errors that abort a run.  Protocol and resource problems (lost frames,
/// full queues, 6P rejections) are logged and recovered locally instead.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("slotframe {0} does not exist")]
    NoSuchSlotframe(u8),

    #[error("slotframe {0} already exists")]
    SlotframeExists(u8),

    #[error("cell (slot {slot_offset}, channel {channel_offset}) already in slotframe {handle}")]
    CellExists { handle: u8, slot_offset: u32, channel_offset: u8 },

    #[error("no mote has EUI-64 {0}")]
    UnknownMote(Eui64),

    #[error(transparent)]
    Core(#[from] TsError),
}

pub type StackResult<T> = Result<T, StackError>;
