use core::alloc::Layout;
use core::cell::{Cell, RefCell};

use alloc::vec::Vec;

use bit_field::BitField;
use copperline::platform::{ChipAllocator, ChipRegion, IrqHandler, Platform};
use copperline::regs::*;
use copperline::scr::{DmaFlags, IntFlags};
use copperline::BlitOp;
use log::{debug, warn};

use crate::blitter::{execute, BlitOutcome, SimBlitter};
use crate::copper::{run_frame, Frame};
use crate::memory::ChipRam;
use crate::registers::{RegisterFile, SimRegisters};

/// Bits of `DMACONR` the CPU cannot write.
const DMA_READ_ONLY: u16 = DmaFlags::BBUSY.bits() | DmaFlags::BZERO.bits();

/// Deliveries per interrupt check before giving up on a handler that never
/// acknowledges.
const DELIVERY_LIMIT: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Chip RAM size in bytes.
    pub chip_ram: usize,
    /// Status polls a transfer stays busy for.
    pub busy_polls: u32,
    /// First status read after a start reports "not busy".
    pub status_erratum: bool,
    /// DMA bits the host has on before anything is leased.
    pub host_dma: DmaFlags,
    pub lines_per_frame: u16,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            chip_ram: 512 * 1024,
            busy_polls: 2,
            status_erratum: false,
            host_dma: DmaFlags::DMAEN | DmaFlags::BLTEN,
            lines_per_frame: 313,
        }
    }
}

/// The whole machine as the scheduling code sees it: register block, chip
/// RAM, both co-processors and the transfer-complete interrupt line.
///
/// `&SimChipset` implements [`Platform`].
pub struct SimChipset {
    config: SimConfig,
    file: RegisterFile,
    ram: ChipRam,
    blitter: RefCell<SimBlitter>,
    history: RefCell<Vec<BlitOutcome>>,
    handler: Cell<Option<IrqHandler>>,
    in_irq: Cell<bool>,
    delivered: Cell<u32>,
    leases: Cell<u32>,
    frames: Cell<u32>,
    last_frame: RefCell<Option<Frame>>,
}

impl SimChipset {
    pub fn new(config: SimConfig) -> Self {
        let file = RegisterFile::default();
        file.set(DMACONR, config.host_dma.bits() & !DMA_READ_ONLY);
        debug!(
            "sim chipset: {} KiB chip ram, {} busy polls, erratum {}",
            config.chip_ram / 1024,
            config.busy_polls,
            config.status_erratum
        );
        Self {
            config,
            file,
            ram: ChipRam::new(config.chip_ram),
            blitter: RefCell::new(SimBlitter::new(config.busy_polls, config.status_erratum)),
            history: RefCell::new(Vec::new()),
            handler: Cell::new(None),
            in_irq: Cell::new(false),
            delivered: Cell::new(0),
            leases: Cell::new(0),
            frames: Cell::new(0),
            last_frame: RefCell::new(None),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn registers(&self) -> SimRegisters<'_> {
        SimRegisters { chip: self }
    }

    pub fn ram(&self) -> &ChipRam {
        &self.ram
    }

    pub(crate) fn file(&self) -> &RegisterFile {
        &self.file
    }

    /// Register value without read side effects.
    pub fn peek(&self, reg: Reg) -> u16 {
        self.file.get(reg)
    }

    pub fn dma(&self) -> DmaFlags {
        DmaFlags::from_bits_retain(self.file.get(DMACONR))
    }

    pub fn blitter_busy(&self) -> bool {
        self.blitter.borrow().is_busy()
    }

    /// Transfers started so far.
    pub fn blits_started(&self) -> u32 {
        self.blitter.borrow().starts
    }

    /// Finished transfers, oldest first.
    pub fn blit_history(&self) -> Vec<BlitOutcome> {
        self.history.borrow().clone()
    }

    pub fn interrupts_delivered(&self) -> u32 {
        self.delivered.get()
    }

    pub fn leases(&self) -> u32 {
        self.leases.get()
    }

    pub fn frames(&self) -> u32 {
        self.frames.get()
    }

    pub fn handler(&self) -> Option<IrqHandler> {
        self.handler.get()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.last_frame.borrow().clone()
    }

    pub(crate) fn read_register(&self, reg: Reg) -> u16 {
        if reg != DMACONR {
            return self.file.get(reg);
        }
        let (busy, done) = self.blitter.borrow_mut().poll();
        if let Some(op) = done {
            self.retire(op);
        }
        let mut status = self.file.get(DMACONR);
        status.set_bit(14, busy);
        status
    }

    pub(crate) fn write_register(&self, reg: Reg, value: u16) {
        match reg {
            DMACONR | INTENAR | INTREQR => {}
            DMACON => self.file.strobe(DMACONR, value, DMA_READ_ONLY),
            INTENA => {
                self.file.strobe(INTENAR, value, 0);
                self.deliver();
            }
            INTREQ => {
                self.file.strobe(INTREQR, value, 0);
                self.deliver();
            }
            BLTSIZE => {
                self.file.set(reg, value);
                self.start_blit();
            }
            _ => self.file.set(reg, value),
        }
    }

    pub(crate) fn write_register_long(&self, reg: Reg, value: u32) {
        self.file.set(reg, (value >> 16) as u16);
        self.file.set(reg.low(), value as u16);
    }

    fn start_blit(&self) {
        let f = &self.file;
        let op = BlitOp {
            con0: f.get(BLTCON0),
            con1: f.get(BLTCON1),
            afwm: f.get(BLTAFWM),
            alwm: f.get(BLTALWM),
            cpt: f.get_long(BLTCPT),
            bpt: f.get_long(BLTBPT),
            apt: f.get_long(BLTAPT),
            dpt: f.get_long(BLTDPT),
            cmod: f.get(BLTCMOD) as i16,
            bmod: f.get(BLTBMOD) as i16,
            amod: f.get(BLTAMOD) as i16,
            dmod: f.get(BLTDMOD) as i16,
            cdat: f.get(BLTCDAT),
            bdat: f.get(BLTBDAT),
            adat: f.get(BLTADAT),
            size: f.get(BLTSIZE),
        };
        self.blitter.borrow_mut().start(op);
    }

    /// Run a latched transfer to completion now, as if its busy time had
    /// elapsed. Returns false if the unit was idle.
    pub fn complete_blit(&self) -> bool {
        let finished = self.blitter.borrow_mut().finish();
        match finished {
            Some(op) => {
                self.retire(op);
                true
            }
            None => false,
        }
    }

    fn retire(&self, op: BlitOp) {
        let outcome = execute(&op, &self.ram);
        let mut status = self.file.get(DMACONR);
        status.set_bit(13, outcome.zero);
        self.file.set(DMACONR, status);
        self.history.borrow_mut().push(outcome);
        self.file
            .strobe(INTREQR, IntFlags::BLIT.set_word(), 0);
        self.deliver();
    }

    /// Call the installed handler while the transfer-complete request is
    /// raised and enabled. Runs on the interrupt path: no logging.
    fn deliver(&self) {
        if self.in_irq.get() {
            return;
        }
        for _ in 0..DELIVERY_LIMIT {
            let enabled = IntFlags::from_bits_retain(self.file.get(INTENAR));
            let requested = IntFlags::from_bits_retain(self.file.get(INTREQR));
            if !enabled.contains(IntFlags::INTEN) || !(enabled & requested).contains(IntFlags::BLIT) {
                return;
            }
            let Some(handler) = self.handler.get() else {
                return;
            };
            self.in_irq.set(true);
            // SAFETY: whoever installed the handler keeps its data alive
            // until swapping it out.
            unsafe { handler.call() };
            self.in_irq.set(false);
            self.delivered.set(self.delivered.get() + 1);
        }
    }

    /// Run the display co-processor for one frame.
    pub fn run_frame(&self) -> Frame {
        let needed = DmaFlags::DMAEN | DmaFlags::COPEN;
        let frame = if self.dma().contains(needed) {
            run_frame(self, self.config.lines_per_frame)
        } else {
            Frame::disabled()
        };
        *self.last_frame.borrow_mut() = Some(frame.clone());
        frame
    }
}

unsafe impl ChipAllocator for &SimChipset {
    fn alloc_chip(&self, layout: Layout) -> Option<ChipRegion> {
        self.ram.alloc(layout)
    }

    unsafe fn free_chip(&self, region: ChipRegion) {
        self.ram.free(region)
    }
}

impl<'a> Platform for &'a SimChipset {
    type Regs = SimRegisters<'a>;

    fn registers(&self) -> Self::Regs {
        SimRegisters { chip: *self }
    }

    fn set_dma_bit(&self, bits: DmaFlags, enabled: bool) {
        debug!("dma {:?} -> {}", bits, enabled);
        let word = if enabled { bits.set_word() } else { bits.clear_word() };
        self.write_register(DMACON, word);
    }

    fn lease_transfer_unit(&self) {
        self.leases.set(self.leases.get() + 1);
    }

    fn release_transfer_unit(&self) {
        match self.leases.get() {
            0 => warn!("transfer unit released without a lease"),
            n => self.leases.set(n - 1),
        }
    }

    fn wait_for_frame_start(&self) {
        self.run_frame();
        self.frames.set(self.frames.get() + 1);
    }

    unsafe fn swap_blit_handler(&self, handler: Option<IrqHandler>) -> Option<IrqHandler> {
        self.handler.replace(handler)
    }
}
