//! # copperline
//!
//! Command-stream scheduling for a chipset built around two DMA-driven
//! co-processors: a display co-processor that runs a small Wait/Move program
//! in step with the video beam, and a transfer co-processor that copies and
//! fills memory blocks on its own.
//!
//! ## Quick Start
//!
//! ```ignore
//! use copperline::{DisplayProgram, ProgramConfig, TransferScheduler, BlitOp};
//! use copperline::regs::COLOR00;
//!
//! let mut program = DisplayProgram::new(platform.clone(), ProgramConfig::default())?;
//! let sky = program.create_block(1, 0, 0x2C)?;
//! program.append_instruction(sky, COLOR00, 0x05AF)?;
//!
//! let mut blits = TransferScheduler::new(platform.clone());
//! blits.enable(32)?;
//!
//! loop {
//!     platform.wait_for_frame_start();
//!     program.compile()?;
//!     blits.submit(BlitOp::fill(back_screen, 20, 256, 0, 0))?;
//! }
//! ```
//!
//! ## Modules
//!
//! | Module       | What it covers                                           |
//! |--------------|----------------------------------------------------------|
//! | [`copper`]   | Display program compiler: blocks, merge, double buffer    |
//! | [`blit`]     | Transfer queue scheduler: ring, interrupt handler         |
//! | [`regs`]     | Register offsets and the [`Registers`](regs::Registers) seam |
//! | [`scr`]      | DMA, interrupt and transfer control bitflags              |
//! | [`platform`] | Chip memory, interrupt sinks, host handoff                |
//!
//! Nothing here touches the machine directly; everything goes through the
//! [`Platform`] trait, which the `copperline-sim` crate implements for tests.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod blit;
pub mod copper;
pub mod error;
pub mod platform;
pub mod regs;
pub mod scr;

#[cfg(test)]
mod testing;

pub use blit::{BlitOp, TransferLease, TransferScheduler};
pub use copper::{BlockId, BufferId, CompileReport, DisplayProgram, Instruction, ProgramConfig, ProgramMode};
pub use error::{Error, Result};
pub use platform::{ChipAllocator, ChipMem, ChipRegion, IrqHandler, Platform};
