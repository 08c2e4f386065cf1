//! Block storage: an arena of blocks plus their position-sorted order.

use alloc::vec::Vec;
use core::fmt;

use crate::copper::instruction::{Instruction, SPLIT_Y};
use crate::regs::Reg;

/// Number of compiles a change takes to reach both buffers.
pub(crate) const ECHO: u8 = 2;

/// A handle to a block in a [`DisplayProgram`](super::DisplayProgram).
///
/// Carries a generation counter so a handle to a destroyed block never
/// reaches a block created later in the same slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl BlockId {
    /// Raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({}@gen{})", self.idx, self.generation)
    }
}

/// "Run these Moves once the beam reaches (x, y)."
#[derive(Debug)]
pub(crate) struct Block {
    pub x: u8,
    pub y: u16,
    pub moves: Vec<u32>,
    pub capacity: usize,
    pub enabled: bool,
    /// Compiles left until a content change has reached both buffers.
    pub updated: u8,
    /// Compiles left until a size change has reached both buffers.
    pub resized: u8,
    /// Offset this block was last written at, per buffer.
    pub emitted_at: [Option<usize>; 2],
}

impl Block {
    fn new(capacity: usize, x: u8, y: u16) -> Self {
        Self {
            x,
            y,
            moves: Vec::with_capacity(capacity),
            capacity,
            enabled: true,
            updated: ECHO,
            resized: ECHO,
            emitted_at: [None; 2],
        }
    }

    #[inline(always)]
    pub fn key(&self) -> (u16, u8) {
        (self.y, self.x)
    }

    /// Whether the program needs the split wait on this block's account.
    #[inline(always)]
    pub fn needs_split(&self) -> bool {
        self.y >= SPLIT_Y
    }

    /// Whether the block can only be reached after the split wait.
    #[inline(always)]
    pub fn past_rollover(&self) -> bool {
        self.y > SPLIT_Y
    }

    #[inline(always)]
    pub fn wait_word(&self) -> u32 {
        Instruction::wait(self.x, (self.y & 0xFF) as u8).encode()
    }

    /// Words this block can occupy in a merged stream.
    #[inline(always)]
    pub fn footprint(&self) -> usize {
        1 + self.capacity
    }

    /// Word count of this block's current contribution.
    #[inline(always)]
    pub fn emitted_len(&self) -> usize {
        1 + self.moves.len()
    }

    pub fn push(&mut self, register: Reg, value: u16) -> bool {
        if self.moves.len() >= self.capacity {
            return false;
        }
        self.moves.push(Instruction::mov(register, value).encode());
        self.touch(true);
        true
    }

    pub fn touch(&mut self, resized: bool) {
        self.updated = ECHO;
        if resized {
            self.resized = ECHO;
        }
    }

    pub fn settle(&mut self) {
        self.updated = self.updated.saturating_sub(1);
        self.resized = self.resized.saturating_sub(1);
    }

    #[inline(always)]
    pub fn is_settled(&self) -> bool {
        self.updated == 0 && self.resized == 0
    }
}

/// Arena of blocks plus the list order the compiler walks.
#[derive(Debug, Default)]
pub(crate) struct BlockStore {
    slots: Vec<Option<Block>>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
    /// Live slot indices, ascending by (y, x) once reordered.
    order: Vec<u32>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a block and insert it at its sorted position.
    pub fn insert(&mut self, capacity: usize, x: u8, y: u16) -> BlockId {
        let block = Block::new(capacity, x, y);
        let key = block.key();

        let idx = if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = Some(block);
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(block));
            self.generation.push(0);
            idx
        };

        let at = self
            .order
            .iter()
            .position(|&other| self.slot(other).is_some_and(|b| b.key() > key))
            .unwrap_or(self.order.len());
        self.order.insert(at, idx);

        BlockId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Remove a block. Returns its former list position.
    pub fn remove(&mut self, id: BlockId) -> Option<usize> {
        self.get(id)?;
        self.slots[id.idx as usize] = None;
        self.generation[id.idx as usize] += 1;
        self.free_list.push(id.idx);
        let at = self.order.iter().position(|&idx| idx == id.idx)?;
        self.order.remove(at);
        Some(at)
    }

    #[cfg(test)]
    pub fn is_alive(&self, id: BlockId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        if self.generation.get(id.idx as usize) != Some(&id.generation) {
            return None;
        }
        self.slot(id.idx)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        if self.generation.get(id.idx as usize) != Some(&id.generation) {
            return None;
        }
        self.slots.get_mut(id.idx as usize)?.as_mut()
    }

    #[inline(always)]
    fn slot(&self, idx: u32) -> Option<&Block> {
        self.slots.get(idx as usize)?.as_ref()
    }

    /// The block after `id` in list order.
    pub fn next_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        let at = self.order.iter().position(|&idx| idx == id.idx)?;
        let next = *self.order.get(at + 1)?;
        self.slots.get_mut(next as usize)?.as_mut()
    }

    /// The block now at list position `at`.
    pub fn at_mut(&mut self, at: usize) -> Option<&mut Block> {
        let idx = *self.order.get(at)?;
        self.slots.get_mut(idx as usize)?.as_mut()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.order.iter().map(|&idx| BlockId {
            idx,
            generation: self.generation[idx as usize],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> + '_ {
        self.order.iter().filter_map(|&idx| self.slot(idx))
    }

    /// Bubble adjacent inversions out of the list order. Returns the number
    /// of swaps.
    ///
    /// The list is nearly sorted from frame to frame, so this settles in one
    /// or two passes.
    pub fn reorder(&mut self) -> usize {
        let mut swaps = 0;
        loop {
            let mut swapped = false;
            for i in 1..self.order.len() {
                let prev = self.slot(self.order[i - 1]).map(Block::key);
                let curr = self.slot(self.order[i]).map(Block::key);
                if prev > curr {
                    self.order.swap(i - 1, i);
                    swapped = true;
                    swaps += 1;
                }
            }
            if !swapped {
                return swaps;
            }
        }
    }

    #[cfg(test)]
    pub fn is_sorted(&self) -> bool {
        self.iter()
            .map(Block::key)
            .collect::<Vec<_>>()
            .windows(2)
            .all(|pair| pair[0] <= pair[1])
    }
}
