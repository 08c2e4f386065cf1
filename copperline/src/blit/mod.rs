//! # Transfer Queue Scheduler
//!
//! The transfer co-processor runs one operation at a time, in parallel with
//! the CPU. [`TransferScheduler`] lets any call site hand it operations
//! without waiting for the previous one.
//!
//! ## Dispatch Modes
//!
//! | Mode   | `submit` does                                                  |
//! |--------|----------------------------------------------------------------|
//! | Direct | leases the unit, waits for it, programs it, releases it        |
//! | Queued | copies the op into a ring slot; the completion interrupt runs it |
//!
//! ```ignore
//! let mut blits = TransferScheduler::new(platform.clone());
//! blits.enable(16)?;                       // queued from here on
//!
//! blits.submit(BlitOp::fill(screen, 20, 200, 0, 0))?;
//! blits.submit(BlitOp::copy(sprite, screen + 40, 2, 16, 0, 36))?;
//!
//! // CPU work here runs in parallel with both operations.
//!
//! blits.wait_idle();
//! blits.disable();                         // back to direct
//! ```
//!
//! ## Ordering
//!
//! Operations run strictly in submission order. An operation submitted to an
//! idle, empty queue is started by `submit` itself; every later one is
//! started from the interrupt handler of the one before it.
//!
//! ## Status Erratum
//!
//! On some chip revisions the busy bit reads clear for a moment right after
//! an operation starts. [`TransferScheduler::wait_idle`] throws the first
//! status read away before polling.

mod guard;
mod op;
mod ring;

use alloc::boxed::Box;

use bit_field::BitField;
use log::{debug, error, warn};

use crate::error::{Error, Result};
use crate::platform::{ChipMem, IrqHandler, Platform};
use crate::regs::{Registers, DMACONR, INTENA, INTENAR, INTREQ};
use crate::scr::{DmaFlags, IntFlags};

use self::ring::{on_blit_interrupt, IrqContext};
pub use self::guard::TransferLease;
pub use self::op::{blit_size, BlitOp, SLOT_EMPTY};

/// Busy bit in `DMACONR`.
const BBUSY_BIT: usize = 14;

/// Spin until the transfer unit reports idle.
#[inline]
fn wait_unit<R: Registers + ?Sized>(regs: &R) {
    // The first read after a start may claim "done" too early.
    let _ = regs.read(DMACONR);
    while regs.read(DMACONR).get_bit(BBUSY_BIT) {
        core::hint::spin_loop();
    }
}

/// Queued-mode state: ring storage, the interrupt's view of it, and what
/// `enable` found so `disable` can put it back.
struct Queue<P: Platform> {
    ctx: Box<IrqContext<P::Regs>>,
    // Dropped after `ctx`, which points into it.
    _slots: ChipMem<BlitOp, P>,
    previous: Option<IrqHandler>,
    saved_int: IntFlags,
    saved_dma: DmaFlags,
}

impl<P: Platform> Queue<P> {
    fn drain(&self) {
        loop {
            wait_unit(self.ctx.regs());
            if self.ctx.is_drained() {
                return;
            }
        }
    }
}

pub struct TransferScheduler<P: Platform> {
    platform: P,
    queue: Option<Queue<P>>,
}

impl<P: Platform> TransferScheduler<P> {
    /// A scheduler in direct mode.
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            queue: None,
        }
    }

    /// Switch to queued mode with a ring of `capacity` slots (holding
    /// `capacity - 1` operations).
    ///
    /// Leases the transfer unit until [`disable`](Self::disable) and installs
    /// the completion handler. Enabling twice is logged and ignored.
    pub fn enable(&mut self, capacity: usize) -> Result<()> {
        if capacity < 2 {
            return Err(Error::InvalidCapacity(capacity));
        }
        if self.queue.is_some() {
            warn!("transfer queue already enabled, ignoring");
            return Ok(());
        }

        self.platform.lease_transfer_unit();
        let regs = self.platform.registers();
        wait_unit(&regs);

        let saved_int = IntFlags::from_bits_retain(regs.read(INTENAR)) & IntFlags::BLIT;
        let saved_dma =
            DmaFlags::from_bits_retain(regs.read(DMACONR)) & (DmaFlags::BLTEN | DmaFlags::BLTPRI);

        let mut slots = match ChipMem::<BlitOp, P>::zeroed(self.platform.clone(), capacity) {
            Ok(slots) => slots,
            Err(err) => {
                error!("transfer queue allocation failed: {}", err);
                self.platform.release_transfer_unit();
                return Err(err);
            }
        };
        slots.as_mut_slice().fill(BlitOp::EMPTY);

        // SAFETY: `slots` is kept next to the context in `Queue` and freed
        // after it.
        let ctx = Box::new(unsafe { IrqContext::new(regs.clone(), slots.as_ptr(), capacity) });

        regs.write(INTENA, IntFlags::BLIT.clear_word());
        let handler = IrqHandler {
            func: on_blit_interrupt::<P::Regs>,
            data: (&*ctx as *const IrqContext<P::Regs>).cast(),
        };
        // SAFETY: the context is boxed and outlives the installation;
        // `disable` swaps the handler out before dropping it.
        let previous = unsafe { self.platform.swap_blit_handler(Some(handler)) };

        self.platform.set_dma_bit(DmaFlags::BLTEN, true);
        regs.write(INTREQ, IntFlags::BLIT.clear_word());
        regs.write(INTENA, (IntFlags::INTEN | IntFlags::BLIT).set_word());

        self.queue = Some(Queue {
            ctx,
            _slots: slots,
            previous,
            saved_int,
            saved_dma,
        });
        debug!("transfer queue enabled, {} slots", capacity);
        Ok(())
    }

    /// Drain the queue, uninstall the handler, restore the enable bits found
    /// by [`enable`](Self::enable) and return to direct mode.
    pub fn disable(&mut self) {
        let Some(queue) = self.queue.take() else {
            warn!("transfer queue already disabled, ignoring");
            return;
        };
        queue.drain();

        let regs = queue.ctx.regs();
        regs.write(INTENA, IntFlags::BLIT.clear_word());
        // SAFETY: restoring whatever was installed before `enable`.
        unsafe { self.platform.swap_blit_handler(queue.previous) };

        if queue.saved_int.contains(IntFlags::BLIT) {
            regs.write(INTENA, IntFlags::BLIT.set_word());
        }
        self.platform
            .set_dma_bit(DmaFlags::BLTEN, queue.saved_dma.contains(DmaFlags::BLTEN));
        self.platform
            .set_dma_bit(DmaFlags::BLTPRI, queue.saved_dma.contains(DmaFlags::BLTPRI));

        drop(queue);
        self.platform.release_transfer_unit();
        debug!("transfer queue disabled");
    }

    /// Run `op`, now or once the operations ahead of it are done.
    ///
    /// A full ring hands `op` back in [`Error::QueueFull`]; nothing blocks
    /// and nothing is dropped. An `op` whose destination is [`SLOT_EMPTY`]
    /// is refused with [`Error::InvalidOp`] in either mode.
    pub fn submit(&self, op: BlitOp) -> Result<()> {
        if op.is_empty() {
            warn!("transfer to ${:08X} rejected", op.dpt);
            return Err(Error::InvalidOp { op });
        }

        let Some(queue) = &self.queue else {
            let _lease = TransferLease::new(&self.platform);
            let regs = self.platform.registers();
            wait_unit(&regs);
            op.program(&regs);
            return Ok(());
        };

        let regs = queue.ctx.regs();
        regs.write(INTENA, IntFlags::BLIT.clear_word());
        let pushed = queue.ctx.push(op);
        regs.write(INTENA, IntFlags::BLIT.set_word());

        pushed.map_err(|op| {
            let capacity = queue.ctx.capacity();
            warn!("transfer queue full ({} slots), operation rejected", capacity);
            Error::QueueFull { op, capacity }
        })
    }

    /// Completion handling for platforms that dispatch the interrupt
    /// themselves. Interrupt context only; does nothing in direct mode.
    pub fn on_operation_done(&self) {
        if let Some(queue) = &self.queue {
            queue.ctx.on_operation_done();
        }
    }

    /// Spin until nothing is queued or running.
    pub fn wait_idle(&self) {
        match &self.queue {
            Some(queue) => queue.drain(),
            None => wait_unit(&self.platform.registers()),
        }
    }

    pub fn is_queued(&self) -> bool {
        self.queue.is_some()
    }

    /// Ring size in slots, in queued mode.
    pub fn capacity(&self) -> Option<usize> {
        self.queue.as_ref().map(|queue| queue.ctx.capacity())
    }

    /// Operations queued or running.
    pub fn pending(&self) -> usize {
        self.queue.as_ref().map_or(0, |queue| queue.ctx.pending())
    }

    /// `(add, consume)` ring cursors, in queued mode.
    pub fn cursors(&self) -> Option<(usize, usize)> {
        self.queue.as_ref().map(|queue| queue.ctx.cursors())
    }
}

impl<P: Platform> Drop for TransferScheduler<P> {
    fn drop(&mut self) {
        if self.queue.is_some() {
            self.disable();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::regs::INTREQR;
    use crate::testing::HostPlatform;

    fn fill(dst: u32) -> BlitOp {
        BlitOp::fill(dst, 1, 1, 0, 0)
    }

    #[test]
    fn direct_mode_programs_at_once() {
        let platform = HostPlatform::new();
        let blits = TransferScheduler::new(platform.clone());
        blits.submit(fill(0x40)).unwrap();
        blits.submit(fill(0x80)).unwrap();
        assert_eq!(platform.starts(), [0x40, 0x80]);
        assert_eq!(platform.leases(), 0);
        assert_eq!(blits.pending(), 0);
        assert!(!blits.is_queued());
    }

    #[test]
    fn queued_submissions_start_in_order() {
        let platform = HostPlatform::new();
        let mut blits = TransferScheduler::new(platform.clone());
        blits.enable(4).unwrap();
        assert_eq!(platform.leases(), 1);

        for dst in [0x10, 0x20, 0x30] {
            blits.submit(fill(dst)).unwrap();
        }
        assert_eq!(platform.starts(), [0x10]);
        assert_eq!(blits.pending(), 3);

        // Through the installed handler, as the interrupt would.
        let handler = platform.handler().unwrap();
        unsafe { handler.call() };
        unsafe { handler.call() };
        assert_eq!(platform.starts(), [0x10, 0x20, 0x30]);

        unsafe { handler.call() };
        assert_eq!(blits.pending(), 0);
        assert_eq!(blits.cursors(), Some((3, 3)));
        assert_eq!(platform.read(INTREQR) & IntFlags::BLIT.bits(), 0);

        blits.disable();
        assert_eq!(platform.leases(), 0);
    }

    #[test]
    fn full_ring_hands_op_back() {
        let platform = HostPlatform::new();
        let mut blits = TransferScheduler::new(platform.clone());
        blits.enable(2).unwrap();
        blits.submit(fill(0x10)).unwrap();
        match blits.submit(fill(0x20)) {
            Err(Error::QueueFull { op, capacity }) => {
                assert_eq!(op, fill(0x20));
                assert_eq!(capacity, 2);
            }
            other => panic!("expected a full queue, got {:?}", other),
        }
        blits.on_operation_done();
        blits.submit(fill(0x20)).unwrap();
        blits.on_operation_done();
        assert_eq!(platform.starts(), [0x10, 0x20]);
    }

    #[test]
    fn empty_slot_destination_is_refused() {
        let platform = HostPlatform::new();
        let mut blits = TransferScheduler::new(platform.clone());
        assert!(matches!(
            blits.submit(BlitOp::EMPTY),
            Err(Error::InvalidOp { .. })
        ));
        assert!(platform.starts().is_empty());

        blits.enable(4).unwrap();
        blits.submit(fill(0x10)).unwrap();
        match blits.submit(fill(SLOT_EMPTY)) {
            Err(Error::InvalidOp { op }) => assert_eq!(op, fill(SLOT_EMPTY)),
            other => panic!("expected a refused op, got {:?}", other),
        }
        blits.submit(fill(0x30)).unwrap();
        assert_eq!(blits.pending(), 2);

        let handler = platform.handler().unwrap();
        for _ in 0..5 {
            unsafe { handler.call() };
        }
        assert_eq!(platform.starts(), [0x10, 0x30]);
        assert_eq!(blits.cursors(), Some((2, 2)));
        assert_eq!(blits.pending(), 0);
    }

    #[test]
    fn enable_rules() {
        let platform = HostPlatform::new();
        let mut blits = TransferScheduler::new(platform.clone());
        assert!(matches!(blits.enable(1), Err(Error::InvalidCapacity(1))));
        assert!(!blits.is_queued());

        blits.enable(8).unwrap();
        blits.enable(16).unwrap();
        assert_eq!(blits.capacity(), Some(8));
        assert_eq!(platform.leases(), 1);
    }

    #[test]
    fn disable_restores_previous_state() {
        fn host_handler(_: *const ()) {}

        let platform = HostPlatform::new();
        let marker = 0x1234 as *const ();
        unsafe {
            platform.swap_blit_handler(Some(IrqHandler {
                func: host_handler,
                data: marker,
            }));
        }

        let mut blits = TransferScheduler::new(platform.clone());
        blits.enable(4).unwrap();
        assert!(platform.dma().contains(DmaFlags::BLTEN));
        assert_ne!(platform.handler().unwrap().data, marker);

        drop(blits);
        assert_eq!(platform.handler().unwrap().data, marker);
        assert!(!platform.dma().contains(DmaFlags::BLTEN));
        assert_eq!(platform.read(INTENAR) & IntFlags::BLIT.bits(), 0);
        assert_eq!(platform.live_allocations(), 0);
        assert_eq!(platform.leases(), 0);
    }
}
