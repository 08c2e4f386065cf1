use copperline::scr::BltCon0;
use copperline::BlitOp;
use log::{debug, warn};

use crate::memory::ChipRam;

/// Transfer co-processor model.
///
/// A start latches the register snapshot. The unit then reports busy for a
/// fixed number of status polls and runs the whole operation on the poll
/// after that.
#[derive(Debug)]
pub struct SimBlitter {
    latched: Option<BlitOp>,
    polls_left: u32,
    busy_polls: u32,
    /// Model of the early-"done" erratum.
    erratum: bool,
    fresh_start: bool,
    pub starts: u32,
}

/// What one finished operation did to memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitOutcome {
    pub op: BlitOp,
    pub words_written: usize,
    /// Every D word was zero.
    pub zero: bool,
    pub bus_errors: usize,
}

impl SimBlitter {
    pub fn default() -> Self {
        Self {
            latched: None,
            polls_left: 0,
            busy_polls: 2,
            erratum: false,
            fresh_start: false,
            starts: 0,
        }
    }

    pub fn new(busy_polls: u32, erratum: bool) -> Self {
        Self {
            busy_polls,
            erratum,
            ..Self::default()
        }
    }

    #[inline(always)]
    pub fn is_busy(&self) -> bool {
        self.latched.is_some()
    }

    /// Latch `op` and go busy. Called from the size register write, which may
    /// come from interrupt context, so no logging here.
    pub fn start(&mut self, op: BlitOp) {
        self.latched = Some(op);
        self.polls_left = self.busy_polls;
        self.fresh_start = true;
        self.starts += 1;
    }

    /// One status read. Returns whether it reports busy, and the operation
    /// if this poll finished it.
    pub fn poll(&mut self) -> (bool, Option<BlitOp>) {
        if self.latched.is_none() {
            return (false, None);
        }
        if core::mem::take(&mut self.fresh_start) && self.erratum {
            return (false, None);
        }
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return (true, None);
        }
        (false, self.latched.take())
    }

    /// Finish the current operation without polling.
    pub fn finish(&mut self) -> Option<BlitOp> {
        self.fresh_start = false;
        self.polls_left = 0;
        self.latched.take()
    }
}

/// Evaluate a minterm over three 16-bit inputs.
#[inline(always)]
pub fn minterm(function: u8, a: u16, b: u16, c: u16) -> u16 {
    let mut d = 0;
    for term in 0..8u8 {
        if function & (1 << term) == 0 {
            continue;
        }
        let pick = |bit: u8, word: u16| if term & bit != 0 { word } else { !word };
        d |= pick(4, a) & pick(2, b) & pick(1, c);
    }
    d
}

#[inline(always)]
fn extent(size: u16) -> (usize, usize) {
    let width = match size & 0x3F {
        0 => 64,
        w => w as usize,
    };
    let height = match size >> 6 {
        0 => 1024,
        h => h as usize,
    };
    (width, height)
}

/// Run `op` against chip RAM.
pub fn execute(op: &BlitOp, ram: &ChipRam) -> BlitOutcome {
    let con0 = BltCon0::from_bits_retain(op.con0);
    let (width, height) = extent(op.size);
    let a_shift = con0.a_shift() as u32;
    let b_shift = (op.con1 >> 12) as u32;

    let (mut apt, mut bpt, mut cpt, mut dpt) = (op.apt, op.bpt, op.cpt, op.dpt);
    let mut outcome = BlitOutcome {
        op: *op,
        words_written: 0,
        zero: true,
        bus_errors: 0,
    };

    let fetch = |use_channel: bool, ptr: &mut u32, fallback: u16, errors: &mut usize| {
        if !use_channel {
            return fallback;
        }
        let word = ram.read_u16(*ptr).unwrap_or_else(|| {
            *errors += 1;
            0
        });
        *ptr = ptr.wrapping_add(2);
        word
    };

    for _ in 0..height {
        let (mut a_prev, mut b_prev) = (0u16, 0u16);
        for x in 0..width {
            let mut a = fetch(con0.contains(BltCon0::USEA), &mut apt, op.adat, &mut outcome.bus_errors);
            if x == 0 {
                a &= op.afwm;
            }
            if x == width - 1 {
                a &= op.alwm;
            }
            let b = fetch(con0.contains(BltCon0::USEB), &mut bpt, op.bdat, &mut outcome.bus_errors);
            let c = fetch(con0.contains(BltCon0::USEC), &mut cpt, op.cdat, &mut outcome.bus_errors);

            let a_shifted = (((a_prev as u32) << 16 | a as u32) >> a_shift) as u16;
            let b_shifted = (((b_prev as u32) << 16 | b as u32) >> b_shift) as u16;
            (a_prev, b_prev) = (a, b);

            let d = minterm(con0.minterm(), a_shifted, b_shifted, c);
            if d != 0 {
                outcome.zero = false;
            }
            if con0.contains(BltCon0::USED) {
                if ram.write_u16(dpt, d) {
                    outcome.words_written += 1;
                } else {
                    outcome.bus_errors += 1;
                }
                dpt = dpt.wrapping_add(2);
            }
        }
        if con0.contains(BltCon0::USEA) {
            apt = apt.wrapping_add_signed(op.amod as i32);
        }
        if con0.contains(BltCon0::USEB) {
            bpt = bpt.wrapping_add_signed(op.bmod as i32);
        }
        if con0.contains(BltCon0::USEC) {
            cpt = cpt.wrapping_add_signed(op.cmod as i32);
        }
        if con0.contains(BltCon0::USED) {
            dpt = dpt.wrapping_add_signed(op.dmod as i32);
        }
    }

    if outcome.bus_errors > 0 {
        warn!(target: "blitter", "blit to ${:06X} touched {} words outside chip ram", op.dpt, outcome.bus_errors);
    }
    debug!(target: "blitter", "blit complete: {}x{} words to ${:06X}", width, height, op.dpt);
    outcome
}

#[cfg(test)]
mod tests {
    use core::alloc::Layout;

    use copperline::blit::blit_size;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::memory::BUS_BASE;

    #[test]
    fn minterm_table() {
        assert_eq!(minterm(0xF0, 0x1234, 0xFFFF, 0x0000), 0x1234);
        assert_eq!(minterm(0xCC, 0x0000, 0xABCD, 0xFFFF), 0xABCD);
        assert_eq!(minterm(0xAA, 0xFFFF, 0x0000, 0x5555), 0x5555);
        // D = A xor C
        assert_eq!(minterm(0x5A, 0xFF00, 0x0000, 0x0FF0), 0xF0F0);
        assert_eq!(minterm(0x00, 0xFFFF, 0xFFFF, 0xFFFF), 0x0000);
    }

    #[test]
    fn busy_then_done() {
        let op = BlitOp::fill(BUS_BASE, 1, 1, 0, 0);
        let mut blitter = SimBlitter::new(2, false);
        blitter.start(op);
        assert_eq!(blitter.poll(), (true, None));
        assert_eq!(blitter.poll(), (true, None));
        assert_eq!(blitter.poll(), (false, Some(op)));
        assert_eq!(blitter.poll(), (false, None));
    }

    #[test]
    fn erratum_first_read_lies() {
        let op = BlitOp::fill(BUS_BASE, 1, 1, 0, 0);
        let mut blitter = SimBlitter::new(1, true);
        blitter.start(op);
        assert_eq!(blitter.poll(), (false, None));
        assert!(blitter.is_busy());
        assert_eq!(blitter.poll(), (true, None));
        assert_eq!(blitter.poll(), (false, Some(op)));
    }

    #[test]
    fn copy_with_modulo_and_masks() {
        let ram = ChipRam::new(256);
        let src = ram.alloc(Layout::array::<u16>(6).unwrap()).unwrap();
        let dst = ram.alloc(Layout::array::<u16>(6).unwrap()).unwrap();
        for (i, word) in [0x1111u16, 0x2222, 0x3333, 0x4444, 0x5555, 0x6666].iter().enumerate() {
            ram.write_u16(src.bus + 2 * i as u32, *word);
        }

        // Two rows of two words out of a three-word-wide source.
        let mut op = BlitOp::copy(src.bus, dst.bus, 2, 2, 2, 2);
        op.afwm = 0x0FFF;
        let outcome = execute(&op, &ram);
        assert_eq!(outcome.words_written, 4);
        assert!(!outcome.zero);

        let read = |i: u32| ram.read_u16(dst.bus + 2 * i).unwrap();
        assert_eq!([read(0), read(1), read(2)], [0x0111, 0x2222, 0]);
        assert_eq!([read(3), read(4), read(5)], [0x0444, 0x5555, 0]);
    }

    #[test]
    fn fill_reports_zero_and_bus_errors() {
        let ram = ChipRam::new(64);
        let outcome = execute(&BlitOp::fill(BUS_BASE, 4, 1, 0, 0), &ram);
        assert!(outcome.zero);
        assert_eq!(outcome.words_written, 4);

        let outcome = execute(&BlitOp::fill(BUS_BASE + 60, 4, 1, 0, 0xFFFF), &ram);
        assert_eq!(outcome.words_written, 2);
        assert_eq!(outcome.bus_errors, 2);
        assert_eq!(blit_size(4, 1), outcome.op.size);
    }
}
