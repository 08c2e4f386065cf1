//! Display co-processor model.
//!
//! Runs the program at `COP1LC` once per frame. The beam advances by a fixed
//! number of colour clocks per fetched instruction, and a Wait compares only
//! the low eight bits of the line counter, so a program has to wait for the
//! end of line 255 before it can target any later line.

use alloc::vec::Vec;

use copperline::copper::Instruction;
use copperline::regs::{Reg, COP1LC, COP2LC, COPJMP1, COPJMP2};

use crate::chipset::SimChipset;

/// Last horizontal beam position of a line, in colour clocks.
pub const LINE_END: u16 = 0xE2;

/// Colour clocks spent fetching one instruction.
const FETCH_CLOCKS: u16 = 4;
/// Colour clocks between a Wait matching and the next fetch.
const WAKE_CLOCKS: u16 = 2;

/// Registers below this offset are off-limits to the co-processor.
const DANGER_LIMIT: u16 = 0x40;

/// Upper bound on instructions per frame, for programs that never end.
pub const MAX_INSTRUCTIONS: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopperMove {
    pub line: u16,
    pub x: u8,
    pub register: Reg,
    pub value: u16,
}

/// Why the co-processor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// DMA was off.
    Disabled,
    /// Waiting for a position past the end of the frame.
    EndOfFrame,
    /// Move to a protected register.
    Danger(Reg),
    /// Fetch outside chip RAM.
    BusError(u32),
    /// Too many instructions in one frame.
    Runaway,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub moves: Vec<CopperMove>,
    pub instructions: usize,
    pub halt: Halt,
}

impl Frame {
    pub fn disabled() -> Self {
        Self {
            moves: Vec::new(),
            instructions: 0,
            halt: Halt::Disabled,
        }
    }

    /// Line each Move to `register` landed on.
    pub fn lines_of(&self, register: Reg) -> Vec<u16> {
        self.moves
            .iter()
            .filter(|m| m.register == register)
            .map(|m| m.line)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Beam {
    pub line: u16,
    pub x: u16,
}

impl Beam {
    pub fn start() -> Self {
        Self { line: 0, x: 0 }
    }

    pub fn advance(&mut self, clocks: u16) {
        self.x += clocks;
        while self.x > LINE_END {
            self.x -= LINE_END + 1;
            self.line += 1;
        }
    }

    /// The hardware comparison: low eight line bits, then x.
    pub fn reached(&self, y: u8, x: u8) -> bool {
        let v = (self.line & 0xFF) as u8;
        v > y || (v == y && self.x >= x as u16)
    }

    /// Move forward to the first position that satisfies a Wait. Returns
    /// false if there is none before `lines`.
    pub fn wait_until(&mut self, y: u8, x: u8, lines: u16) -> bool {
        while !self.reached(y, x) {
            if (self.line & 0xFF) as u8 == y {
                if x as u16 > LINE_END {
                    self.line += 1;
                    self.x = 0;
                } else {
                    self.x = x as u16;
                }
            } else {
                self.line = (self.line & 0xFF00) | y as u16;
                self.x = 0;
            }
            if self.line >= lines {
                return false;
            }
        }
        true
    }
}

/// Execute one frame of the program at `COP1LC`.
pub(crate) fn run_frame(chip: &SimChipset, lines: u16) -> Frame {
    let mut frame = Frame {
        moves: Vec::new(),
        instructions: 0,
        halt: Halt::EndOfFrame,
    };
    let mut pc = chip.file().get_long(COP1LC);
    let mut beam = Beam::start();

    for _ in 0..MAX_INSTRUCTIONS {
        let Some(word) = chip.ram().read_u32(pc) else {
            frame.halt = Halt::BusError(pc);
            return frame;
        };
        pc = pc.wrapping_add(4);
        frame.instructions += 1;
        beam.advance(FETCH_CLOCKS);
        if beam.line >= lines {
            return frame;
        }

        match Instruction::decode(word) {
            Instruction::Move { register, value } => {
                if register.offset() < DANGER_LIMIT {
                    frame.halt = Halt::Danger(register);
                    return frame;
                }
                frame.moves.push(CopperMove {
                    line: beam.line,
                    x: beam.x as u8,
                    register,
                    value,
                });
                match register {
                    COPJMP1 => pc = chip.file().get_long(COP1LC),
                    COPJMP2 => pc = chip.file().get_long(COP2LC),
                    _ => chip.write_register(register, value),
                }
            }
            Instruction::Wait {
                x,
                y,
                ignore_transfer_done,
                skip,
            } => {
                if !ignore_transfer_done {
                    chip.complete_blit();
                }
                if skip {
                    if beam.reached(y, x) {
                        pc = pc.wrapping_add(4);
                    }
                } else {
                    if !beam.wait_until(y, x, lines) {
                        return frame;
                    }
                    beam.advance(WAKE_CLOCKS);
                }
            }
        }
    }

    frame.halt = Halt::Runaway;
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAL_LINES: u16 = 313;

    #[test]
    fn low_wait_fires_early_without_split() {
        let mut beam = Beam::start();
        assert!(beam.wait_until(300u16 as u8, 0x10, PAL_LINES));
        assert_eq!(beam, Beam { line: 44, x: 0x10 });
    }

    #[test]
    fn split_wait_crosses_rollover() {
        let mut beam = Beam::start();
        assert!(beam.wait_until(0xFF, 0xDE, PAL_LINES));
        beam.advance(WAKE_CLOCKS);
        beam.advance(FETCH_CLOCKS);
        assert_eq!(beam.line, 256);

        assert!(beam.wait_until(300u16 as u8, 0x10, PAL_LINES));
        assert_eq!(beam, Beam { line: 300, x: 0x10 });
    }

    #[test]
    fn terminator_is_never_reached() {
        let mut beam = Beam::start();
        assert!(!beam.wait_until(0xFF, 0xFE, PAL_LINES));

        let mut beam = Beam { line: 280, x: 0 };
        assert!(!beam.wait_until(0xFF, 0xFE, PAL_LINES));
    }

    #[test]
    fn passed_positions_match_at_once() {
        let mut beam = Beam { line: 50, x: 0x20 };
        assert!(beam.wait_until(40, 0x80, PAL_LINES));
        assert_eq!(beam, Beam { line: 50, x: 0x20 });
        assert!(beam.reached(50, 0x20));
        assert!(!beam.reached(50, 0x22));
    }
}
