//! # Custom Chip Register Surface
//!
//! Every register the display and transfer co-processors expose lives in one
//! 512-byte block of 16-bit words. Registers are addressed by their byte
//! offset from the block base ([`Reg`]); the display co-processor's Move
//! instruction uses the same offsets.
//!
//! ## Register Layout (subset)
//!
//! | Offset | Name      | Description                                   |
//! |--------|-----------|-----------------------------------------------|
//! | `$002` | DMACONR   | DMA enable bits + transfer busy (read)        |
//! | `$01C` | INTENAR   | Interrupt enable bits (read)                  |
//! | `$01E` | INTREQR   | Interrupt request bits (read)                 |
//! | `$040` | BLTCON0   | Channel enables + minterm                     |
//! | `$042` | BLTCON1   | Mode bits                                     |
//! | `$044` | BLTAFWM   | First word mask, channel A                    |
//! | `$046` | BLTALWM   | Last word mask, channel A                     |
//! | `$048` | BLTCPT    | Channel pointers C, B, A, D (long each)       |
//! | `$058` | BLTSIZE   | Height/width; writing it starts the transfer  |
//! | `$060` | BLTCMOD   | Modulos C, B, A, D                            |
//! | `$070` | BLTCDAT   | Data registers C, B, A                        |
//! | `$080` | COP1LC    | First program pointer (long)                  |
//! | `$084` | COP2LC    | Second program pointer (long)                 |
//! | `$096` | DMACON    | DMA enable set/clear (write)                  |
//! | `$09A` | INTENA    | Interrupt enable set/clear (write)            |
//! | `$09C` | INTREQ    | Interrupt request set/clear (write)           |
//! | `$180` | COLOR00   | First of 32 palette registers                 |
//!
//! All access goes through the [`Registers`] trait so the scheduling code
//! runs unchanged against the real block ([`CustomRegs`]) or a model of it.

use core::fmt;

use volatile_register::RW;

/// Byte offset of a chipset register from the register-block base.
///
/// Only even offsets below `$200` name a register.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u16);

impl Reg {
    /// One past the last register offset.
    pub const LIMIT: u16 = 0x200;

    #[inline(always)]
    pub const fn offset(self) -> u16 {
        self.0
    }

    /// Word index into the register block.
    #[inline(always)]
    pub const fn index(self) -> usize {
        (self.0 >> 1) as usize
    }

    /// The low half of a long register pair.
    #[inline(always)]
    pub const fn low(self) -> Reg {
        Reg(self.0 + 2)
    }

    /// Whether a Move instruction can target this offset.
    #[inline(always)]
    pub const fn is_valid(self) -> bool {
        self.0 & 1 == 0 && self.0 < Self::LIMIT
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reg(${:03X})", self.0)
    }
}

pub const DMACONR: Reg = Reg(0x002);
pub const VPOSR: Reg = Reg(0x004);
pub const VHPOSR: Reg = Reg(0x006);
pub const INTENAR: Reg = Reg(0x01C);
pub const INTREQR: Reg = Reg(0x01E);

pub const BLTCON0: Reg = Reg(0x040);
pub const BLTCON1: Reg = Reg(0x042);
pub const BLTAFWM: Reg = Reg(0x044);
pub const BLTALWM: Reg = Reg(0x046);
pub const BLTCPT: Reg = Reg(0x048);
pub const BLTBPT: Reg = Reg(0x04C);
pub const BLTAPT: Reg = Reg(0x050);
pub const BLTDPT: Reg = Reg(0x054);
pub const BLTSIZE: Reg = Reg(0x058);
pub const BLTCMOD: Reg = Reg(0x060);
pub const BLTBMOD: Reg = Reg(0x062);
pub const BLTAMOD: Reg = Reg(0x064);
pub const BLTDMOD: Reg = Reg(0x066);
pub const BLTCDAT: Reg = Reg(0x070);
pub const BLTBDAT: Reg = Reg(0x072);
pub const BLTADAT: Reg = Reg(0x074);

pub const COP1LC: Reg = Reg(0x080);
pub const COP2LC: Reg = Reg(0x084);
pub const COPJMP1: Reg = Reg(0x088);
pub const COPJMP2: Reg = Reg(0x08A);

pub const DMACON: Reg = Reg(0x096);
pub const INTENA: Reg = Reg(0x09A);
pub const INTREQ: Reg = Reg(0x09C);

pub const BPLCON0: Reg = Reg(0x100);
pub const BPL1MOD: Reg = Reg(0x108);
pub const COLOR00: Reg = Reg(0x180);

/// Palette register `n` (0-31).
#[inline(always)]
pub const fn color(n: u8) -> Reg {
    Reg(COLOR00.0 + 2 * (n as u16 & 0x1F))
}

/// Access to the register block.
///
/// Long accesses are a single bus operation on hardware; the program-pointer
/// publish relies on that.
pub trait Registers {
    fn read(&self, reg: Reg) -> u16;
    fn write(&self, reg: Reg, value: u16);
    fn write_long(&self, reg: Reg, value: u32);

    fn read_long(&self, reg: Reg) -> u32 {
        ((self.read(reg) as u32) << 16) | self.read(reg.low()) as u32
    }
}

impl<R: Registers + ?Sized> Registers for &R {
    #[inline(always)]
    fn read(&self, reg: Reg) -> u16 {
        (**self).read(reg)
    }

    #[inline(always)]
    fn write(&self, reg: Reg, value: u16) {
        (**self).write(reg, value)
    }

    #[inline(always)]
    fn write_long(&self, reg: Reg, value: u32) {
        (**self).write_long(reg, value)
    }

    #[inline(always)]
    fn read_long(&self, reg: Reg) -> u32 {
        (**self).read_long(reg)
    }
}

/// Memory-mapped custom chip register block.
#[repr(C, align(4))]
pub struct CustomRegs {
    words: [RW<u16>; (Reg::LIMIT / 2) as usize],
}

impl CustomRegs {
    /// Default base address of the register block.
    pub const BASE: usize = 0xDF_F000;

    /// Get a reference to the register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must point at the register block (or at 512 bytes of 4-aligned
    /// memory standing in for it) for the rest of the program.
    #[inline(always)]
    pub unsafe fn at(base: usize) -> &'static CustomRegs {
        unsafe { &*(base as *const CustomRegs) }
    }

    /// Get a reference to the register block at [`CustomRegs::BASE`].
    ///
    /// # Safety
    ///
    /// Only valid on the target machine.
    #[inline(always)]
    pub unsafe fn new() -> &'static CustomRegs {
        unsafe { Self::at(Self::BASE) }
    }

    #[inline(always)]
    fn long_ptr(&self, reg: Reg) -> *mut u32 {
        self.words[reg.index()..].as_ptr().cast::<u32>().cast_mut()
    }
}

// Word order inside a long register is high half first, whatever the host's
// byte order.
#[inline(always)]
const fn long_to_bus(value: u32) -> u32 {
    if cfg!(target_endian = "little") { value.rotate_left(16) } else { value }
}

impl Registers for CustomRegs {
    #[inline(always)]
    fn read(&self, reg: Reg) -> u16 {
        self.words[reg.index()].read()
    }

    #[inline(always)]
    fn write(&self, reg: Reg, value: u16) {
        unsafe { self.words[reg.index()].write(value) }
    }

    #[inline(always)]
    fn write_long(&self, reg: Reg, value: u32) {
        debug_assert!(reg.offset() & 3 == 0);
        unsafe { core::ptr::write_volatile(self.long_ptr(reg), long_to_bus(value)) }
    }

    #[inline(always)]
    fn read_long(&self, reg: Reg) -> u32 {
        long_to_bus(unsafe { core::ptr::read_volatile(self.long_ptr(reg)) })
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use super::*;

    fn host_block() -> Box<CustomRegs> {
        // SAFETY: an all-zero register block is a valid value.
        Box::new(unsafe { core::mem::zeroed() })
    }

    #[test]
    fn word_access() {
        let regs = host_block();
        regs.write(COLOR00, 0x0F00);
        regs.write(color(31), 0x00F0);
        assert_eq!(regs.read(COLOR00), 0x0F00);
        assert_eq!(regs.read(Reg(0x1BE)), 0x00F0);
    }

    #[test]
    fn long_write_is_high_half_first() {
        let regs = host_block();
        regs.write_long(COP1LC, 0x0001_2340);
        assert_eq!(regs.read(COP1LC), 0x0001);
        assert_eq!(regs.read(COP1LC.low()), 0x2340);
        assert_eq!(regs.read_long(COP1LC), 0x0001_2340);
    }

    #[test]
    fn move_targets() {
        assert!(COLOR00.is_valid());
        assert!(!Reg(0x181).is_valid());
        assert!(!Reg(0x200).is_valid());
    }
}
