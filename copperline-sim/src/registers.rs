use core::cell::Cell;

use copperline::regs::{Reg, Registers};

use crate::chipset::SimChipset;

/// Raw storage behind the custom register block. Side effects live in
/// [`SimChipset::write_register`].
pub struct RegisterFile {
    words: [Cell<u16>; (Reg::LIMIT / 2) as usize],
}

impl RegisterFile {
    pub fn default() -> Self {
        Self {
            words: core::array::from_fn(|_| Cell::new(0)),
        }
    }

    #[inline(always)]
    pub fn get(&self, reg: Reg) -> u16 {
        self.words[reg.index()].get()
    }

    #[inline(always)]
    pub fn set(&self, reg: Reg, value: u16) {
        self.words[reg.index()].set(value)
    }

    #[inline(always)]
    pub fn get_long(&self, reg: Reg) -> u32 {
        ((self.get(reg) as u32) << 16) | self.get(reg.low()) as u32
    }

    /// Apply a SET/CLR strobe word to `reg`, leaving `keep` bits alone.
    #[inline(always)]
    pub fn strobe(&self, reg: Reg, value: u16, keep: u16) {
        let bits = value & 0x7FFF & !keep;
        let old = self.get(reg);
        let new = if value & 0x8000 != 0 { old | bits } else { old & !bits };
        self.set(reg, new);
    }
}

/// The CPU's view of the register block: what the interrupt path gets.
#[derive(Clone, Copy)]
pub struct SimRegisters<'a> {
    pub(crate) chip: &'a SimChipset,
}

impl Registers for SimRegisters<'_> {
    #[inline(always)]
    fn read(&self, reg: Reg) -> u16 {
        self.chip.read_register(reg)
    }

    #[inline(always)]
    fn write(&self, reg: Reg, value: u16) {
        self.chip.write_register(reg, value)
    }

    fn write_long(&self, reg: Reg, value: u32) {
        self.chip.write_register_long(reg, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copperline::regs::{DMACONR, INTENAR};

    #[test]
    fn strobe_keeps_read_only_bits() {
        let file = RegisterFile::default();
        file.set(DMACONR, 0x4000);
        file.strobe(DMACONR, 0x8240, 0x6000);
        assert_eq!(file.get(DMACONR), 0x4240);
        file.strobe(DMACONR, 0x7FFF, 0x6000);
        assert_eq!(file.get(DMACONR), 0x4000);

        file.strobe(INTENAR, 0xC040, 0);
        assert_eq!(file.get(INTENAR), 0x4040);
    }
}
