//! The queue shared between foreground code and the completion interrupt.
//!
//! ```text
//!            consume              add
//!               v                  v
//!   [ empty | in flight | queued | empty | empty ]
//! ```
//!
//! Foreground code only moves `add`, the handler only moves `consume`.
//! Equal cursors mean nothing is queued or in flight. One slot always stays
//! free, so a ring of `n` slots holds `n - 1` operations.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::blit::op::{BlitOp, SLOT_EMPTY};
use crate::regs::{Registers, INTREQ};
use crate::scr::IntFlags;

pub(crate) struct IrqContext<R: Registers> {
    regs: R,
    slots: *mut BlitOp,
    capacity: usize,
    add: AtomicUsize,
    consume: AtomicUsize,
    in_flight: AtomicBool,
}

impl<R: Registers> IrqContext<R> {
    /// # Safety
    ///
    /// `slots` must point at `capacity` initialised slots that outlive the
    /// context.
    pub unsafe fn new(regs: R, slots: *mut BlitOp, capacity: usize) -> Self {
        Self {
            regs,
            slots,
            capacity,
            add: AtomicUsize::new(0),
            consume: AtomicUsize::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    fn next(&self, index: usize) -> usize {
        if index + 1 == self.capacity { 0 } else { index + 1 }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// `(add, consume)`.
    pub fn cursors(&self) -> (usize, usize) {
        (
            self.add.load(Ordering::Acquire),
            self.consume.load(Ordering::Acquire),
        )
    }

    /// Operations queued or in flight.
    pub fn pending(&self) -> usize {
        let (add, consume) = self.cursors();
        (add + self.capacity - consume) % self.capacity
    }

    pub fn is_drained(&self) -> bool {
        let (add, consume) = self.cursors();
        add == consume && !self.in_flight.load(Ordering::Acquire)
    }

    /// Queue `op`, starting it at once if the unit is idle. Hands `op` back
    /// when the ring is full.
    ///
    /// The completion interrupt must be masked for the duration.
    pub fn push(&self, op: BlitOp) -> Result<(), BlitOp> {
        let (add, consume) = self.cursors();
        let next = self.next(add);
        if next == consume {
            return Err(op);
        }
        let idle = add == consume;
        // SAFETY: `add` < capacity and the handler never reads at `add`.
        unsafe { self.slots.add(add).write_volatile(op) };
        self.add.store(next, Ordering::Release);
        if idle {
            self.in_flight.store(true, Ordering::Release);
            op.program(&self.regs);
        }
        Ok(())
    }

    /// Retire the finished slot and start the next one. Interrupt context:
    /// bounded, no allocation, no logging.
    pub fn on_operation_done(&self) {
        // Some chip revisions drop a single clear.
        self.regs.write(INTREQ, IntFlags::BLIT.clear_word());
        self.regs.write(INTREQ, IntFlags::BLIT.clear_word());

        let mut consume = self.consume.load(Ordering::Acquire);
        if self.in_flight.load(Ordering::Acquire) {
            // SAFETY: `consume` < capacity.
            unsafe { (*self.slots.add(consume)).dpt = SLOT_EMPTY };
            consume = self.next(consume);
            self.consume.store(consume, Ordering::Release);
            self.in_flight.store(false, Ordering::Release);
        }

        if consume == self.add.load(Ordering::Acquire) {
            return;
        }
        // SAFETY: `consume` < capacity and the slot was published by `push`.
        let op = unsafe { self.slots.add(consume).read_volatile() };
        if !op.is_empty() {
            self.in_flight.store(true, Ordering::Release);
            op.program(&self.regs);
        }
    }
}

/// Trampoline installed as the completion handler.
///
/// # Safety
///
/// `data` must point at a live `IrqContext<R>`.
pub(crate) unsafe fn on_blit_interrupt<R: Registers>(data: *const ()) {
    let ctx = unsafe { &*data.cast::<IrqContext<R>>() };
    ctx.on_operation_done();
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::testing::HostPlatform;

    #[test]
    fn cursors_wrap() {
        let platform = HostPlatform::new();
        let mut slots = vec![BlitOp::EMPTY; 3];
        let ctx = unsafe { IrqContext::new(platform.clone(), slots.as_mut_ptr(), 3) };

        for round in 0..5u32 {
            let op = BlitOp::fill(0x100 * (round + 1), 1, 1, 0, 0);
            assert!(ctx.push(op).is_ok());
            assert_eq!(ctx.pending(), 1);
            ctx.on_operation_done();
            assert!(ctx.is_drained());
        }
        assert_eq!(ctx.cursors(), (2, 2));
        assert_eq!(
            platform.starts(),
            [0x100, 0x200, 0x300, 0x400, 0x500]
        );
    }

    #[test]
    fn one_slot_stays_free() {
        let platform = HostPlatform::new();
        let mut slots = vec![BlitOp::EMPTY; 3];
        let ctx = unsafe { IrqContext::new(platform, slots.as_mut_ptr(), 3) };

        assert!(ctx.push(BlitOp::fill(0x10, 1, 1, 0, 0)).is_ok());
        assert!(ctx.push(BlitOp::fill(0x20, 1, 1, 0, 0)).is_ok());
        let rejected = BlitOp::fill(0x30, 1, 1, 0, 0);
        assert_eq!(ctx.push(rejected), Err(rejected));
        assert_eq!(ctx.pending(), 2);

        ctx.on_operation_done();
        ctx.on_operation_done();
        assert!(ctx.is_drained());
        assert!(slots.iter().all(BlitOp::is_empty));
    }

    #[test]
    fn spurious_completion_is_harmless() {
        let platform = HostPlatform::new();
        let mut slots = vec![BlitOp::EMPTY; 2];
        let ctx = unsafe { IrqContext::new(platform.clone(), slots.as_mut_ptr(), 2) };
        ctx.on_operation_done();
        assert_eq!(ctx.cursors(), (0, 0));
        assert!(platform.starts().is_empty());
    }
}
