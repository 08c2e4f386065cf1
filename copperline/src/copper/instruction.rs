//! # Display Co-processor Instructions
//!
//! Every instruction is one 32-bit word, most significant bit first.
//!
//! ```text
//! Move  | 0000000 | register (9, even) | value (16)                          |
//!         31..25    24..16              15..0
//!
//! Wait  | Y (8) | X/2 (7) | 1 | BFD | VE mask (7) | HE mask (7) | skip |
//!         31..24  23..17    16  15    14..8         7..1          0
//! ```
//!
//! `BFD` set means "do not also wait for the transfer unit to finish". The
//! horizontal comparator runs at half resolution, so the X field stores the
//! beam position shifted right by one. Constructors round odd positions down
//! so that a decoded word compares equal to the instruction that produced it.

use bitfield::bitfield;

use crate::regs::Reg;

/// End-of-program marker: wait for a position the beam never reaches.
pub const TERMINATOR: u32 = 0xFFFF_FFFE;

/// Wait for the last horizontal position of line 255. Emitted once ahead of
/// the first block past line 255, after which the 8-bit vertical comparator
/// has rolled over.
pub const SPLIT_WAIT: u32 = 0xFFDF_FFFE;

/// Beam X of [`SPLIT_WAIT`].
pub const SPLIT_X: u8 = 0xDF;
/// Beam Y of [`SPLIT_WAIT`] and the first line that needs it.
pub const SPLIT_Y: u16 = 0xFF;

const COMPARE_ALL: u8 = 0x7F;

bitfield! {
    /// Raw Move word.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct MoveWord(u32);
    impl Debug;
    pub u16, register, set_register: 24, 16;
    pub u16, value, set_value: 15, 0;
}

bitfield! {
    /// Raw Wait/Skip word.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct WaitWord(u32);
    impl Debug;
    pub u8, vp, set_vp: 31, 24;
    pub u8, hp, set_hp: 23, 17;
    pub marker, set_marker: 16;
    pub bfd, set_bfd: 15;
    pub u8, ve, set_ve: 14, 8;
    pub u8, he, set_he: 7, 1;
    pub skip, set_skip: 0;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instruction {
    /// Write `value` to `register`.
    Move { register: Reg, value: u16 },
    /// Stall until the beam reaches (`x`, `y`), or with `skip` set, skip the
    /// next instruction if it already has.
    Wait {
        x: u8,
        y: u8,
        ignore_transfer_done: bool,
        skip: bool,
    },
}

impl Instruction {
    pub const END: Instruction = Instruction::wait(0xFF, 0xFF);

    #[inline(always)]
    pub const fn mov(register: Reg, value: u16) -> Self {
        Instruction::Move { register, value }
    }

    /// Plain wait that does not care about the transfer unit.
    #[inline(always)]
    pub const fn wait(x: u8, y: u8) -> Self {
        Instruction::Wait {
            x: x & !1,
            y,
            ignore_transfer_done: true,
            skip: false,
        }
    }

    #[inline(always)]
    pub const fn skip(x: u8, y: u8) -> Self {
        Instruction::Wait {
            x: x & !1,
            y,
            ignore_transfer_done: true,
            skip: true,
        }
    }

    pub fn encode(self) -> u32 {
        match self {
            Instruction::Move { register, value } => {
                let mut word = MoveWord(0);
                word.set_register(register.offset() & 0x1FE);
                word.set_value(value);
                word.0
            }
            Instruction::Wait {
                x,
                y,
                ignore_transfer_done,
                skip,
            } => {
                let mut word = WaitWord(0);
                word.set_vp(y);
                word.set_hp(x >> 1);
                word.set_marker(true);
                word.set_bfd(ignore_transfer_done);
                word.set_ve(COMPARE_ALL);
                word.set_he(COMPARE_ALL);
                word.set_skip(skip);
                word.0
            }
        }
    }

    pub fn decode(raw: u32) -> Self {
        let wait = WaitWord(raw);
        if wait.marker() {
            Instruction::Wait {
                x: wait.hp() << 1,
                y: wait.vp(),
                ignore_transfer_done: wait.bfd(),
                skip: wait.skip(),
            }
        } else {
            let mov = MoveWord(raw);
            Instruction::Move {
                register: Reg(mov.register()),
                value: mov.value(),
            }
        }
    }

    #[inline(always)]
    pub fn is_terminator(self) -> bool {
        self.encode() == TERMINATOR
    }
}

impl From<Instruction> for u32 {
    fn from(instruction: Instruction) -> u32 {
        instruction.encode()
    }
}

impl From<u32> for Instruction {
    fn from(raw: u32) -> Instruction {
        Instruction::decode(raw)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::regs::{color, COLOR00};

    #[test]
    fn move_layout() {
        assert_eq!(Instruction::mov(COLOR00, 0x0F00).encode(), 0x0180_0F00);
        assert_eq!(Instruction::mov(color(1), 0xFFFF).encode(), 0x0182_FFFF);
        assert_eq!(Instruction::mov(Reg(0x1FE), 0x1234).encode(), 0x01FE_1234);
    }

    #[test]
    fn wait_layout() {
        assert_eq!(Instruction::wait(0x06, 0x2C).encode(), 0x2C07_FFFE);
        assert_eq!(Instruction::wait(0x07, 0x2C).encode(), 0x2C07_FFFE);
        assert_eq!(Instruction::skip(0x06, 0x2C).encode(), 0x2C07_FFFF);

        let blitter_gated = Instruction::Wait {
            x: 0,
            y: 0x80,
            ignore_transfer_done: false,
            skip: false,
        };
        assert_eq!(blitter_gated.encode(), 0x8001_7FFE);
    }

    #[test]
    fn sentinels() {
        assert_eq!(Instruction::END.encode(), TERMINATOR);
        assert_eq!(Instruction::wait(SPLIT_X, SPLIT_Y as u8).encode(), SPLIT_WAIT);
        assert!(Instruction::decode(TERMINATOR).is_terminator());
    }

    #[test]
    fn decode_keeps_fields() {
        assert_eq!(
            Instruction::decode(0x0180_0F00),
            Instruction::mov(COLOR00, 0x0F00)
        );
        assert_eq!(
            Instruction::decode(0x2C07_FFFE),
            Instruction::wait(0x06, 0x2C)
        );
        assert_eq!(
            Instruction::decode(0x8001_7FFE),
            Instruction::Wait {
                x: 0,
                y: 0x80,
                ignore_transfer_done: false,
                skip: false,
            }
        );
    }

    #[test]
    fn decode_inverts_encode() {
        assert_eq!(Instruction::wait(0x07, 0x2C), Instruction::wait(0x06, 0x2C));
        assert_eq!(Instruction::decode(TERMINATOR), Instruction::END);
        assert_eq!(
            Instruction::decode(SPLIT_WAIT),
            Instruction::wait(SPLIT_X, SPLIT_Y as u8)
        );

        let samples = [
            Instruction::END,
            Instruction::wait(SPLIT_X, SPLIT_Y as u8),
            Instruction::wait(0x01, 0x00),
            Instruction::wait(0xE1, 0x2C),
            Instruction::skip(0x33, 0x80),
            Instruction::mov(color(31), 0x0ABC),
            Instruction::Wait {
                x: 0x10,
                y: 0x40,
                ignore_transfer_done: false,
                skip: true,
            },
        ];
        for instruction in samples {
            assert_eq!(Instruction::decode(instruction.encode()), instruction);
        }
    }

    #[test]
    fn raw_fields() {
        let word = WaitWord(SPLIT_WAIT);
        assert_eq!(word.vp(), 0xFF);
        assert_eq!(word.hp(), 0x6F);
        assert_eq!(word.ve(), 0x7F);
        assert_eq!(word.he(), 0x7F);
        assert!(word.marker());
        assert!(word.bfd());
        assert!(!word.skip());
    }
}
