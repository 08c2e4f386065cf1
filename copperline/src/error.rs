use thiserror::Error;

use crate::blit::BlitOp;
use crate::copper::BlockId;
use crate::regs::Reg;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("chip memory exhausted allocating {bytes} bytes")]
    OutOfChipMemory { bytes: usize },

    #[error("a fixed-size display program needs at least one instruction")]
    InvalidProgramSize,

    #[error("transfer queue capacity {0} is too small, at least 2 slots are needed")]
    InvalidCapacity(usize),

    #[error("{0:?} is not a live block")]
    UnknownBlock(BlockId),

    #[error("{id:?} is full ({capacity} instructions)")]
    BlockFull { id: BlockId, capacity: usize },

    #[error("{0:?} is not a writable register offset")]
    InvalidRegister(Reg),

    #[error("index {index} is out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("operation needs a {expected} display program")]
    WrongMode { expected: &'static str },

    #[error("destination ${:08X} marks an empty queue slot", .op.dpt)]
    InvalidOp { op: BlitOp },

    #[error("transfer queue is full ({capacity} slots)")]
    QueueFull { op: BlitOp, capacity: usize },
}
