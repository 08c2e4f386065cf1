//! # Display Program Compiler
//!
//! The display co-processor runs one flat list of Wait/Move instructions per
//! frame. Application code does not write that list; it owns *blocks*:
//!
//! ```ignore
//! let mut program = DisplayProgram::new(platform, ProgramConfig::default())?;
//!
//! // "At line 44, set the background to red"
//! let sky = program.create_block(2, 0, 44)?;
//! program.append_instruction(sky, COLOR00, 0x0F00)?;
//!
//! loop {
//!     platform.wait_for_frame_start();
//!     program.compile()?;  // merge, swap, publish
//! }
//! ```
//!
//! ## Compile Stages
//!
//! | Stage    | Runs when                            | Does                                       |
//! |----------|--------------------------------------|--------------------------------------------|
//! | Realloc  | a block was created or destroyed     | sizes and allocates the back buffer        |
//! | Reorder  | a block moved (or was created)       | bubbles the block list back into (y, x)    |
//! | Merge    | anything changed                     | rewrites the back buffer from the blocks   |
//! | Swap     | always                               | back becomes front; pointer is published   |
//!
//! ## Pipeline Delay
//!
//! The buffer the CPU writes this frame is not the one it wrote last frame,
//! so every change has to be applied twice before both buffers agree. Each
//! stage keeps a "this pass" and a "carried" bit; a stage that runs because
//! of a fresh change sets its carried bit so it runs once more next frame.
//! Blocks keep matching two-tick counters for content and size changes.
//!
//! ## Beam Rollover
//!
//! A Wait's Y field is 8 bits wide. Blocks below line 255 are reached by
//! waiting for the end of line 255 first ([`SPLIT_WAIT`]), after which the
//! comparator sees `y & 0xFF`. Any block at line 255 or later puts exactly
//! one split wait in the program: in front of the first block below line
//! 255, or after the line-255 blocks when there is none.

mod block;
mod buffer;
pub mod instruction;

use bitflags::bitflags;
use log::{debug, error, warn};

use crate::error::{Error, Result};
use crate::platform::{ChipAllocator, Platform};
use crate::regs::{Reg, Registers, COP1LC};
use crate::scr::DmaFlags;

use self::block::{Block, BlockStore};
use self::buffer::CommandBuffer;
pub use self::block::BlockId;
pub use self::buffer::BufferId;
pub use self::instruction::{Instruction, SPLIT_WAIT, TERMINATOR};

/// How a program's instruction stream is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramMode {
    /// Merged from blocks by [`DisplayProgram::compile`].
    Blocks,
    /// A fixed-size stream the caller writes with [`DisplayProgram::raw_write`].
    Raw { words: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramConfig {
    pub mode: ProgramMode,
    /// Program pointer the front buffer is published to.
    pub pointer: Reg,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            mode: ProgramMode::Blocks,
            pointer: COP1LC,
        }
    }
}

bitflags! {
    /// Compile stages still owed, per pass.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub(crate) struct Pending: u8 {
        const REALLOC       = 0b00_0001;
        const REALLOC_CARRY = 0b00_0010;
        const REORDER       = 0b00_0100;
        const REORDER_CARRY = 0b00_1000;
        const MERGE         = 0b01_0000;
        const MERGE_CARRY   = 0b10_0000;
    }
}

impl Pending {
    /// Clear a stage's bits after it ran, carrying a fresh request over to
    /// the next pass.
    fn advance(&mut self, this_pass: Pending, carry: Pending) {
        let fresh = self.contains(this_pass);
        self.remove(this_pass | carry);
        if fresh {
            self.insert(carry);
        }
    }
}

/// What one [`DisplayProgram::compile`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Buffer size in words, when it was recomputed from the block list.
    pub recomputed_words: Option<usize>,
    /// Whether the back buffer was freshly allocated.
    pub reallocated: bool,
    /// Whether the reorder stage ran.
    pub reordered: bool,
    /// Whether the back buffer was rewritten.
    pub merged: bool,
}

/// A double-buffered display co-processor program.
pub struct DisplayProgram<P: Platform> {
    platform: P,
    config: ProgramConfig,
    blocks: BlockStore,
    buffers: [CommandBuffer<P>; 2],
    front: BufferId,
    pending: Pending,
    published: bool,
}

impl<P: Platform> DisplayProgram<P> {
    /// Allocate both buffers.
    ///
    /// A block program starts out as a lone terminator; a raw program starts
    /// as `words` terminators.
    pub fn new(platform: P, config: ProgramConfig) -> Result<Self> {
        let words = match config.mode {
            ProgramMode::Blocks => 1,
            ProgramMode::Raw { words: 0 } => return Err(Error::InvalidProgramSize),
            ProgramMode::Raw { words } => words,
        };
        let buffers = [
            CommandBuffer::with_capacity(platform.clone(), words)?,
            CommandBuffer::with_capacity(platform.clone(), words)?,
        ];
        debug!("display program created: {:?}, {} words", config.mode, words);
        Ok(Self {
            platform,
            config,
            blocks: BlockStore::new(),
            buffers,
            front: BufferId(0),
            pending: Pending::empty(),
            published: false,
        })
    }

    #[inline]
    pub fn config(&self) -> ProgramConfig {
        self.config
    }

    fn require_blocks(&self) -> Result<()> {
        match self.config.mode {
            ProgramMode::Blocks => Ok(()),
            ProgramMode::Raw { .. } => Err(Error::WrongMode { expected: "block" }),
        }
    }

    /// Create a block holding up to `max_instructions` Moves, run once the
    /// beam reaches (`x`, `y`). Capacity is fixed from here on.
    pub fn create_block(&mut self, max_instructions: usize, x: u8, y: u16) -> Result<BlockId> {
        self.require_blocks()?;
        let id = self.blocks.insert(max_instructions, x, y);
        self.pending |= Pending::REALLOC | Pending::REORDER | Pending::MERGE;
        debug!("created {:?} at ({}, {}), {} slots", id, x, y, max_instructions);
        Ok(id)
    }

    /// Remove a block. Unknown handles are logged and ignored.
    pub fn destroy_block(&mut self, id: BlockId) {
        let Some(at) = self.blocks.remove(id) else {
            warn!("destroy of unknown block {:?} ignored", id);
            return;
        };
        if let Some(next) = self.blocks.at_mut(at) {
            next.touch(true);
        }
        self.pending |= Pending::REALLOC | Pending::MERGE;
        debug!("destroyed {:?}", id);
    }

    /// Move a block to a new beam position.
    pub fn set_wait(&mut self, id: BlockId, x: u8, y: u16) {
        let Some(block) = self.blocks.get_mut(id) else {
            warn!("set_wait on unknown block {:?} ignored", id);
            return;
        };
        block.x = x;
        block.y = y;
        block.touch(true);
        self.pending |= Pending::REORDER | Pending::MERGE;
    }

    /// Append `Move(register, value)` to a block.
    pub fn append_instruction(&mut self, id: BlockId, register: Reg, value: u16) -> Result<()> {
        if !register.is_valid() {
            return Err(Error::InvalidRegister(register));
        }
        let block = self.blocks.get_mut(id).ok_or(Error::UnknownBlock(id))?;
        if !block.push(register, value) {
            return Err(Error::BlockFull {
                id,
                capacity: block.capacity,
            });
        }
        self.pending |= Pending::MERGE;
        Ok(())
    }

    /// Overwrite the Move at `index` in place.
    pub fn set_instruction(
        &mut self,
        id: BlockId,
        index: usize,
        register: Reg,
        value: u16,
    ) -> Result<()> {
        if !register.is_valid() {
            return Err(Error::InvalidRegister(register));
        }
        let block = self.blocks.get_mut(id).ok_or(Error::UnknownBlock(id))?;
        let len = block.moves.len();
        let slot = block
            .moves
            .get_mut(index)
            .ok_or(Error::OutOfRange { index, len })?;
        *slot = Instruction::mov(register, value).encode();
        block.touch(false);
        self.pending |= Pending::MERGE;
        Ok(())
    }

    /// Drop every Move in a block, keeping its capacity and position.
    pub fn reset_block(&mut self, id: BlockId) -> Result<()> {
        let block = self.blocks.get_mut(id).ok_or(Error::UnknownBlock(id))?;
        block.moves.clear();
        block.touch(true);
        self.pending |= Pending::MERGE;
        Ok(())
    }

    pub fn enable(&mut self, id: BlockId) {
        self.set_enabled(id, true);
    }

    pub fn disable(&mut self, id: BlockId) {
        self.set_enabled(id, false);
    }

    fn set_enabled(&mut self, id: BlockId, enabled: bool) {
        let Some(block) = self.blocks.get_mut(id) else {
            warn!("enable/disable of unknown block {:?} ignored", id);
            return;
        };
        if block.enabled == enabled {
            return;
        }
        block.enabled = enabled;
        block.touch(true);
        // The follower's offset depends on whether this block is emitted.
        if let Some(next) = self.blocks.next_mut(id) {
            next.touch(true);
        }
        self.pending |= Pending::MERGE;
    }

    /// Write one instruction into a raw program.
    ///
    /// `target` is the buffer the caller believes is the back buffer. If it
    /// is actually the front one, the write goes to the back buffer instead.
    pub fn raw_write(&mut self, target: BufferId, index: usize, instruction: Instruction) -> Result<()> {
        if !matches!(self.config.mode, ProgramMode::Raw { .. }) {
            return Err(Error::WrongMode { expected: "raw" });
        }
        let back = self.back_id();
        if target != back {
            warn!("raw write aimed at the front buffer, redirected to {:?}", back);
        }
        let buffer = &mut self.buffers[back.index()];
        let len = buffer.capacity();
        if !buffer.put(index, instruction.encode()) {
            return Err(Error::OutOfRange { index, len });
        }
        Ok(())
    }

    /// Per-frame entry point: bring the back buffer up to date, then make it
    /// the front buffer and publish it.
    ///
    /// On an allocation failure nothing is swapped and every pending stage
    /// is kept, so the next call retries.
    pub fn compile(&mut self) -> Result<CompileReport> {
        let mut report = CompileReport::default();
        let back = self.back_id();

        if matches!(self.config.mode, ProgramMode::Blocks) {
            let mut full = false;

            if self.pending.intersects(Pending::REALLOC | Pending::REALLOC_CARRY) {
                let topology = self.pending.contains(Pending::REALLOC);
                let words = if topology {
                    self.required_words()
                } else {
                    self.buffers[self.front.index()].capacity()
                };
                let buffer = &mut self.buffers[back.index()];
                if topology || buffer.capacity() != words {
                    if let Err(err) = buffer.reallocate(self.platform.clone(), words) {
                        error!("display program realloc of {} words failed: {}", words, err);
                        return Err(err);
                    }
                    debug!("back buffer {:?} reallocated: {} words", back, words);
                    report.reallocated = true;
                    full = true;
                }
                report.recomputed_words = topology.then_some(words);
                self.pending.advance(Pending::REALLOC, Pending::REALLOC_CARRY);
            }

            if self.pending.intersects(Pending::REORDER | Pending::REORDER_CARRY) {
                let swaps = self.blocks.reorder();
                if swaps > 0 {
                    debug!("reordered blocks with {} swaps", swaps);
                }
                report.reordered = true;
                self.pending.advance(Pending::REORDER, Pending::REORDER_CARRY);
            }

            if full || self.pending.intersects(Pending::MERGE | Pending::MERGE_CARRY) {
                merge(&mut self.blocks, &mut self.buffers[back.index()], back, full);
                report.merged = true;
                self.pending.advance(Pending::MERGE, Pending::MERGE_CARRY);
            }
        }

        self.swap();
        Ok(report)
    }

    fn swap(&mut self) {
        let back = self.back_id();
        let Some(address) = self.buffers[back.index()].bus_address() else {
            return;
        };
        self.front = back;
        // One long write: the co-processor never sees half a pointer.
        self.platform
            .registers()
            .write_long(self.config.pointer, address);
        if !self.published {
            self.platform.set_dma_bit(DmaFlags::COPEN, true);
            self.published = true;
            debug!("display program published at ${:06X}", address);
        }
    }

    /// Buffer size that fits every block at full capacity, enabled or not,
    /// plus the split wait and the terminator.
    fn required_words(&self) -> usize {
        self.blocks.iter().map(Block::footprint).sum::<usize>() + 2
    }

    pub fn block_len(&self, id: BlockId) -> Option<usize> {
        self.blocks.get(id).map(|block| block.moves.len())
    }

    pub fn block_capacity(&self, id: BlockId) -> Option<usize> {
        self.blocks.get(id).map(|block| block.capacity)
    }

    pub fn is_enabled(&self, id: BlockId) -> Option<bool> {
        self.blocks.get(id).map(|block| block.enabled)
    }

    /// `(x, y)` the block waits for.
    pub fn wait_position(&self, id: BlockId) -> Option<(u8, u16)> {
        self.blocks.get(id).map(|block| (block.x, block.y))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block handles in the order the last reorder left them.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.ids()
    }

    /// The published stream, decoded.
    pub fn front(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.buffers[self.front.index()].instructions()
    }

    pub fn front_words(&self) -> &[u32] {
        self.buffers[self.front.index()].words()
    }

    /// Bus address of the published buffer.
    pub fn front_address(&self) -> Option<u32> {
        self.buffers[self.front.index()].bus_address()
    }

    #[inline]
    pub fn back_id(&self) -> BufferId {
        self.front.other()
    }
}

impl<P: Platform> Drop for DisplayProgram<P> {
    fn drop(&mut self) {
        if self.published {
            // Stop the co-processor before its buffers go away.
            self.platform.set_dma_bit(DmaFlags::COPEN, false);
            self.platform.wait_for_frame_start();
        }
        debug!("display program released");
    }
}

/// Write the enabled blocks into `buffer` in list order and terminate it.
/// Returns the stream length in words.
///
/// Every Wait is written; a body is copied only when it may differ from what
/// this buffer already holds at that offset.
fn merge<A: ChipAllocator>(
    blocks: &mut BlockStore,
    buffer: &mut CommandBuffer<A>,
    target: BufferId,
    full: bool,
) -> usize {
    let slot = target.index();
    let mut at = 0;
    let mut split = false;
    let mut wants_split = false;

    for i in 0..blocks.len() {
        let Some(block) = blocks.at_mut(i) else {
            continue;
        };
        if !block.enabled {
            block.emitted_at[slot] = None;
            continue;
        }
        wants_split |= block.needs_split();
        if block.past_rollover() && !split {
            buffer.put(at, SPLIT_WAIT);
            at += 1;
            split = true;
        }

        let stale = full || !block.is_settled() || block.emitted_at[slot] != Some(at);
        buffer.put(at, block.wait_word());
        if stale {
            for (i, &word) in block.moves.iter().enumerate() {
                buffer.put(at + 1 + i, word);
            }
        }
        block.emitted_at[slot] = Some(at);
        at += block.emitted_len();
        block.settle();
    }

    // Line 255 is still reachable before the split, so its blocks go first.
    if wants_split && !split {
        buffer.put(at, SPLIT_WAIT);
        at += 1;
    }

    let ok = buffer.put(at, TERMINATOR);
    debug_assert!(ok, "merged stream overran its buffer");
    buffer.set_len(at + 1);
    at + 1
}
