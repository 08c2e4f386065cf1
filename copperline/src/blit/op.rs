//! Transfer operation descriptors.
//!
//! A [`BlitOp`] is a full snapshot of the transfer unit's registers. Queue
//! slots hold them in chip memory; the interrupt handler replays a slot
//! onto the registers with [`BlitOp::program`].

use crate::regs::{
    Registers, BLTADAT, BLTAFWM, BLTALWM, BLTAMOD, BLTAPT, BLTBDAT, BLTBMOD, BLTBPT, BLTCDAT,
    BLTCMOD, BLTCON0, BLTCON1, BLTCPT, BLTDMOD, BLTDPT, BLTSIZE,
};
use crate::scr::BltCon0;

/// Destination pointer value marking an unused queue slot. No transfer
/// writes to the top of the address space.
pub const SLOT_EMPTY: u32 = u32::MAX;

/// Pack a size register value. A width of 64 words or a height of 1024
/// lines is encoded as 0.
#[inline(always)]
pub const fn blit_size(width_words: u16, height: u16) -> u16 {
    ((height & 0x3FF) << 6) | (width_words & 0x3F)
}

/// Register snapshot for one transfer operation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitOp {
    pub con0: u16,
    pub con1: u16,
    pub afwm: u16,
    pub alwm: u16,
    pub cpt: u32,
    pub bpt: u32,
    pub apt: u32,
    pub dpt: u32,
    pub cmod: i16,
    pub bmod: i16,
    pub amod: i16,
    pub dmod: i16,
    pub cdat: u16,
    pub bdat: u16,
    pub adat: u16,
    /// Written last; starts the operation.
    pub size: u16,
}

impl BlitOp {
    pub const EMPTY: BlitOp = BlitOp {
        con0: 0,
        con1: 0,
        afwm: 0xFFFF,
        alwm: 0xFFFF,
        cpt: 0,
        bpt: 0,
        apt: 0,
        dpt: SLOT_EMPTY,
        cmod: 0,
        bmod: 0,
        amod: 0,
        dmod: 0,
        cdat: 0,
        bdat: 0,
        adat: 0,
        size: 0,
    };

    /// `D = A` over a `width_words` x `height` rectangle.
    ///
    /// Modulos are the byte gaps between the end of one row and the start of
    /// the next.
    pub const fn copy(
        src: u32,
        dst: u32,
        width_words: u16,
        height: u16,
        src_mod: i16,
        dst_mod: i16,
    ) -> Self {
        BlitOp {
            con0: (BltCon0::USEA.union(BltCon0::USED))
                .with_minterm(BltCon0::MINTERM_A)
                .bits(),
            apt: src,
            dpt: dst,
            amod: src_mod,
            dmod: dst_mod,
            size: blit_size(width_words, height),
            ..Self::EMPTY
        }
    }

    /// Fill a rectangle with `value`. Channel A is left off so its data
    /// register supplies the constant.
    pub const fn fill(dst: u32, width_words: u16, height: u16, dst_mod: i16, value: u16) -> Self {
        BlitOp {
            con0: BltCon0::USED.with_minterm(BltCon0::MINTERM_A).bits(),
            dpt: dst,
            dmod: dst_mod,
            adat: value,
            size: blit_size(width_words, height),
            ..Self::EMPTY
        }
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.dpt == SLOT_EMPTY
    }

    /// Load every register and start the operation. Safe to call from an
    /// interrupt handler.
    #[inline]
    pub fn program<R: Registers + ?Sized>(&self, regs: &R) {
        regs.write(BLTCON0, self.con0);
        regs.write(BLTCON1, self.con1);
        regs.write(BLTAFWM, self.afwm);
        regs.write(BLTALWM, self.alwm);
        regs.write_long(BLTCPT, self.cpt);
        regs.write_long(BLTBPT, self.bpt);
        regs.write_long(BLTAPT, self.apt);
        regs.write_long(BLTDPT, self.dpt);
        regs.write(BLTCMOD, self.cmod as u16);
        regs.write(BLTBMOD, self.bmod as u16);
        regs.write(BLTAMOD, self.amod as u16);
        regs.write(BLTDMOD, self.dmod as u16);
        regs.write(BLTCDAT, self.cdat);
        regs.write(BLTBDAT, self.bdat);
        regs.write(BLTADAT, self.adat);
        regs.write(BLTSIZE, self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_packing() {
        assert_eq!(blit_size(1, 1), 0x0041);
        assert_eq!(blit_size(20, 200), (200 << 6) | 20);
        assert_eq!(blit_size(64, 1024), 0);
    }

    #[test]
    fn builders() {
        let copy = BlitOp::copy(0x1000, 0x2000, 4, 8, 2, -2);
        assert_eq!(copy.con0, 0x09F0);
        assert_eq!(copy.size, blit_size(4, 8));
        assert!(!copy.is_empty());

        let fill = BlitOp::fill(0x2000, 2, 2, 0, 0xAAAA);
        assert_eq!(fill.con0, 0x01F0);
        assert_eq!(fill.adat, 0xAAAA);
        assert!(BlitOp::EMPTY.is_empty());
    }
}
