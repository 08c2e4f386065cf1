//! # copperline-sim
//!
//! A software model of the chipset `copperline` drives, for running display
//! programs and transfer queues off-target.
//!
//! | Piece          | Models                                                  |
//! |----------------|---------------------------------------------------------|
//! | [`ChipRam`]    | DMA-visible memory with a first-fit allocator           |
//! | [`SimBlitter`] | transfer unit: busy time, minterms, masks, modulos      |
//! | `copper`       | display co-processor: 8-bit Wait comparator, Moves      |
//! | [`SimChipset`] | register side effects and interrupt delivery            |
//!
//! ```ignore
//! let chip = SimChipset::new(SimConfig::default());
//! let mut program = DisplayProgram::new(&chip, ProgramConfig::default())?;
//! // ...
//! program.compile()?;
//! let frame = chip.run_frame();
//! ```
//!
//! Time only moves when something looks: a transfer finishes on a status
//! poll (or [`SimChipset::complete_blit`]), a frame runs on
//! [`SimChipset::run_frame`] or `wait_for_frame_start`.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod blitter;
pub mod chipset;
pub mod copper;
pub mod memory;
pub mod registers;

pub use blitter::{BlitOutcome, SimBlitter};
pub use chipset::{SimChipset, SimConfig};
pub use copper::{CopperMove, Frame, Halt};
pub use memory::{AllocStats, ChipRam, BUS_BASE};
pub use registers::SimRegisters;
