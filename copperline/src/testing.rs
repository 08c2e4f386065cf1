//! Minimal host stand-in for the machine. The cycle-level model lives in
//! `copperline-sim`; this one only remembers what it was told.

use core::alloc::Layout;
use core::cell::{Cell, RefCell};
use core::ptr::NonNull;
use std::rc::Rc;
use std::vec::Vec;

use crate::platform::{ChipAllocator, ChipRegion, IrqHandler, Platform};
use crate::regs::{Reg, Registers, BLTDPT, BLTSIZE, DMACON, DMACONR, INTENA, INTENAR, INTREQ, INTREQR};
use crate::scr::DmaFlags;

struct HostState {
    regs: [Cell<u16>; (Reg::LIMIT / 2) as usize],
    next_bus: Cell<u32>,
    live: Cell<usize>,
    fail: Cell<bool>,
    leases: Cell<i32>,
    frames: Cell<u32>,
    handler: Cell<Option<IrqHandler>>,
    starts: RefCell<Vec<u32>>,
}

#[derive(Clone)]
pub(crate) struct HostPlatform(Rc<HostState>);

impl HostPlatform {
    pub fn new() -> Self {
        Self(Rc::new(HostState {
            regs: core::array::from_fn(|_| Cell::new(0)),
            next_bus: Cell::new(0x1000),
            live: Cell::new(0),
            fail: Cell::new(false),
            leases: Cell::new(0),
            frames: Cell::new(0),
            handler: Cell::new(None),
            starts: RefCell::new(Vec::new()),
        }))
    }

    pub fn dma(&self) -> DmaFlags {
        DmaFlags::from_bits_retain(self.read(DMACONR))
    }

    pub fn fail_allocations(&self, fail: bool) {
        self.0.fail.set(fail);
    }

    pub fn live_allocations(&self) -> usize {
        self.0.live.get()
    }

    pub fn frames_waited(&self) -> u32 {
        self.0.frames.get()
    }

    pub fn leases(&self) -> i32 {
        self.0.leases.get()
    }

    pub fn handler(&self) -> Option<IrqHandler> {
        self.0.handler.get()
    }

    /// Destination pointer of every started transfer, in start order.
    pub fn starts(&self) -> Vec<u32> {
        self.0.starts.borrow().clone()
    }

    fn strobe(&self, reg: Reg, value: u16) {
        let cell = &self.0.regs[reg.index()];
        let bits = value & 0x7FFF;
        if value & 0x8000 != 0 {
            cell.set(cell.get() | bits);
        } else {
            cell.set(cell.get() & !bits);
        }
    }
}

impl Registers for HostPlatform {
    fn read(&self, reg: Reg) -> u16 {
        self.0.regs[reg.index()].get()
    }

    fn write(&self, reg: Reg, value: u16) {
        match reg {
            DMACON => self.strobe(DMACONR, value),
            INTENA => self.strobe(INTENAR, value),
            INTREQ => self.strobe(INTREQR, value),
            BLTSIZE => {
                self.0.regs[reg.index()].set(value);
                self.0.starts.borrow_mut().push(self.read_long(BLTDPT));
            }
            _ => self.0.regs[reg.index()].set(value),
        }
    }

    fn write_long(&self, reg: Reg, value: u32) {
        self.0.regs[reg.index()].set((value >> 16) as u16);
        self.0.regs[reg.low().index()].set(value as u16);
    }
}

unsafe impl ChipAllocator for HostPlatform {
    fn alloc_chip(&self, layout: Layout) -> Option<ChipRegion> {
        if self.0.fail.get() {
            return None;
        }
        let ptr = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })?;
        let bus = self.0.next_bus.get();
        self.0.next_bus.set(bus + ((layout.size() as u32 + 15) & !15));
        self.0.live.set(self.0.live.get() + 1);
        Some(ChipRegion { ptr, bus, layout })
    }

    unsafe fn free_chip(&self, region: ChipRegion) {
        unsafe { std::alloc::dealloc(region.ptr.as_ptr(), region.layout) };
        self.0.live.set(self.0.live.get() - 1);
    }
}

impl Platform for HostPlatform {
    type Regs = HostPlatform;

    fn registers(&self) -> Self::Regs {
        self.clone()
    }

    fn set_dma_bit(&self, bits: DmaFlags, enabled: bool) {
        let word = if enabled { bits.set_word() } else { bits.clear_word() };
        self.write(DMACON, word);
    }

    fn lease_transfer_unit(&self) {
        self.0.leases.set(self.0.leases.get() + 1);
    }

    fn release_transfer_unit(&self) {
        self.0.leases.set(self.0.leases.get() - 1);
    }

    fn wait_for_frame_start(&self) {
        self.0.frames.set(self.0.frames.get() + 1);
    }

    unsafe fn swap_blit_handler(&self, handler: Option<IrqHandler>) -> Option<IrqHandler> {
        self.0.handler.replace(handler)
    }
}
