//! # DMA & Interrupt Control Flags
//!
//! Bitflags for the chipset's DMA control and interrupt registers.
//!
//! ## DmaFlags (`DMACON` / `DMACONR`)
//!
//! | Flag      | Effect                                                 |
//! |-----------|--------------------------------------------------------|
//! | `SET_CLR` | Set (1) or clear (0) every other bit written           |
//! | `BBUSY`   | Transfer unit busy (read-only)                         |
//! | `BZERO`   | Last transfer produced all-zero output (read-only)     |
//! | `BLTPRI`  | Transfer unit steals every bus cycle it can            |
//! | `DMAEN`   | Master DMA enable                                      |
//! | `COPEN`   | Display co-processor DMA                               |
//! | `BLTEN`   | Transfer co-processor DMA                              |
//!
//! ## IntFlags (`INTENA` / `INTREQ`)
//!
//! Same set/clear strobe convention. `BLIT` is the "transfer operation
//! complete" line, `COPER` the display co-processor's own request line.
//!
//! ## BltCon0 (`BLTCON0`)
//!
//! Upper byte: A shift and channel enables. Lower byte: the minterm, a truth
//! table over the A, B and C inputs (`0xF0` = A, `0xCC` = B, `0xAA` = C).

bitflags::bitflags! {
    /// DMA control flags written to `DMACON` and read back from `DMACONR`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct DmaFlags: u16 {
        /// Write strobe: set the other written bits when 1, clear them when 0.
        const SET_CLR             = 0b1000_0000_0000_0000;
        /// Transfer unit is busy. Read-only.
        const BBUSY               = 0b0100_0000_0000_0000;
        /// Transfer unit output was all zero. Read-only.
        const BZERO               = 0b0010_0000_0000_0000;
        /// Transfer unit has bus priority over the CPU.
        const BLTPRI              = 0b0000_0100_0000_0000;
        /// Master enable for every DMA channel below.
        const DMAEN               = 0b0000_0010_0000_0000;
        /// Bitplane DMA.
        const BPLEN               = 0b0000_0001_0000_0000;
        /// Display co-processor DMA.
        const COPEN               = 0b0000_0000_1000_0000;
        /// Transfer co-processor DMA.
        const BLTEN               = 0b0000_0000_0100_0000;
        /// Sprite DMA.
        const SPREN               = 0b0000_0000_0010_0000;
        /// Disk DMA.
        const DSKEN               = 0b0000_0000_0001_0000;
        const AUD3EN              = 0b0000_0000_0000_1000;
        const AUD2EN              = 0b0000_0000_0000_0100;
        const AUD1EN              = 0b0000_0000_0000_0010;
        const AUD0EN              = 0b0000_0000_0000_0001;
    }

    /// Interrupt flags shared by `INTENA`/`INTENAR` and `INTREQ`/`INTREQR`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct IntFlags: u16 {
        /// Write strobe: set the other written bits when 1, clear them when 0.
        const SET_CLR             = 0b1000_0000_0000_0000;
        /// Master interrupt enable (enable register only).
        const INTEN               = 0b0100_0000_0000_0000;
        const EXTER               = 0b0010_0000_0000_0000;
        const DSKSYN              = 0b0001_0000_0000_0000;
        const RBF                 = 0b0000_1000_0000_0000;
        const AUD3                = 0b0000_0100_0000_0000;
        const AUD2                = 0b0000_0010_0000_0000;
        const AUD1                = 0b0000_0001_0000_0000;
        const AUD0                = 0b0000_0000_1000_0000;
        /// Transfer operation complete.
        const BLIT                = 0b0000_0000_0100_0000;
        /// Vertical blank.
        const VERTB               = 0b0000_0000_0010_0000;
        /// Display co-processor request.
        const COPER               = 0b0000_0000_0001_0000;
        const PORTS               = 0b0000_0000_0000_1000;
        const SOFT                = 0b0000_0000_0000_0100;
        const DSKBLK              = 0b0000_0000_0000_0010;
        const TBE                 = 0b0000_0000_0000_0001;
    }
}

bitflags::bitflags! {
    /// Channel enables in `BLTCON0`. The minterm byte is not a flag.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct BltCon0: u16 {
        const USEA                = 0b0000_1000_0000_0000;
        const USEB                = 0b0000_0100_0000_0000;
        const USEC                = 0b0000_0010_0000_0000;
        const USED                = 0b0000_0001_0000_0000;
        const _ = !0;
    }
}

impl BltCon0 {
    pub const MINTERM_A: u8 = 0xF0;
    pub const MINTERM_B: u8 = 0xCC;
    pub const MINTERM_C: u8 = 0xAA;

    #[inline(always)]
    pub const fn minterm(self) -> u8 {
        self.bits() as u8
    }

    /// A barrel shift, in bits.
    #[inline(always)]
    pub const fn a_shift(self) -> u16 {
        self.bits() >> 12
    }

    #[inline(always)]
    pub const fn with_minterm(self, minterm: u8) -> Self {
        Self::from_bits_retain((self.bits() & 0xFF00) | minterm as u16)
    }
}

impl DmaFlags {
    /// Word that sets `self` when written to `DMACON`.
    #[inline(always)]
    pub const fn set_word(self) -> u16 {
        self.bits() | Self::SET_CLR.bits()
    }

    /// Word that clears `self` when written to `DMACON`.
    #[inline(always)]
    pub const fn clear_word(self) -> u16 {
        self.bits() & !Self::SET_CLR.bits()
    }
}

impl IntFlags {
    /// Word that sets `self` when written to `INTENA`/`INTREQ`.
    #[inline(always)]
    pub const fn set_word(self) -> u16 {
        self.bits() | Self::SET_CLR.bits()
    }

    /// Word that clears `self` when written to `INTENA`/`INTREQ`.
    #[inline(always)]
    pub const fn clear_word(self) -> u16 {
        self.bits() & !Self::SET_CLR.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strobe_words() {
        assert_eq!(DmaFlags::BLTEN.set_word(), 0x8040);
        assert_eq!(DmaFlags::BLTEN.clear_word(), 0x0040);
        assert_eq!((IntFlags::INTEN | IntFlags::BLIT).set_word(), 0xC040);
        assert_eq!(IntFlags::BLIT.clear_word(), 0x0040);
    }

    #[test]
    fn control_word() {
        let con0 = (BltCon0::USEA | BltCon0::USED).with_minterm(0xF0);
        assert_eq!(con0.bits(), 0x09F0);
        assert_eq!(con0.minterm(), 0xF0);
        assert_eq!(BltCon0::from_bits_retain(0x4BCA).a_shift(), 4);
    }
}
