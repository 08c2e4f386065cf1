//! # Command Buffers
//!
//! A display program is double buffered. The co-processor reads the *front*
//! buffer while the CPU rebuilds the *back* one; [`DisplayProgram::compile`]
//! swaps them once per frame.
//!
//! ```text
//!   frame N:    hardware -> [ A ]     CPU -> [ B ]
//!   frame N+1:  hardware -> [ B ]     CPU -> [ A ]
//! ```
//!
//! Software never writes the front buffer: the co-processor may be halfway
//! through it.
//!
//! [`DisplayProgram::compile`]: super::DisplayProgram::compile

use crate::copper::instruction::{Instruction, TERMINATOR};
use crate::error::Result;
use crate::platform::{ChipAllocator, ChipMem};

/// Which of a program's two buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferId(pub(crate) u8);

impl BufferId {
    #[inline(always)]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub(crate) fn other(self) -> BufferId {
        BufferId(self.0 ^ 1)
    }
}

/// Instruction words in chip memory plus the count of valid ones.
pub(crate) struct CommandBuffer<A: ChipAllocator> {
    mem: Option<ChipMem<u32, A>>,
    len: usize,
}

impl<A: ChipAllocator> CommandBuffer<A> {
    pub const fn empty() -> Self {
        Self { mem: None, len: 0 }
    }

    /// Allocate `words` slots, all holding the terminator.
    pub fn with_capacity(alloc: A, words: usize) -> Result<Self> {
        let mut buffer = Self::empty();
        buffer.reallocate(alloc, words)?;
        Ok(buffer)
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.mem.as_ref().map_or(0, ChipMem::len)
    }

    pub fn bus_address(&self) -> Option<u32> {
        self.mem.as_ref().map(ChipMem::bus_address)
    }

    /// Drop the current storage and allocate `words` fresh slots.
    ///
    /// On failure the buffer is left unallocated.
    pub fn reallocate(&mut self, alloc: A, words: usize) -> Result<()> {
        self.release();
        let mut mem = ChipMem::zeroed(alloc, words)?;
        mem.as_mut_slice().fill(TERMINATOR);
        self.len = words;
        self.mem = Some(mem);
        Ok(())
    }

    pub fn release(&mut self) {
        self.mem = None;
        self.len = 0;
    }

    /// Write `word` at `index`. Returns false when out of capacity.
    #[inline(always)]
    pub fn put(&mut self, index: usize, word: u32) -> bool {
        match self.mem.as_mut().and_then(|mem| mem.as_mut_slice().get_mut(index)) {
            Some(slot) => {
                *slot = word;
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }

    pub fn words(&self) -> &[u32] {
        match &self.mem {
            Some(mem) => &mem.as_slice()[..self.len],
            None => &[],
        }
    }

    pub fn instructions(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.words().iter().copied().map(Instruction::decode)
    }
}
