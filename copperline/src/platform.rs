//! # Platform Abstraction
//!
//! The scheduling code never touches the machine directly. It goes through
//! three seams that the application (or a model of the chipset) provides:
//!
//! - [`Registers`] - the custom chip register block.
//! - [`ChipAllocator`] - memory the co-processors can reach by DMA. Every
//!   command buffer and every transfer queue slot lives there.
//! - [`Platform`] - cooperative handoff with the host environment: DMA enable
//!   bits, transfer-unit leasing, frame sync and interrupt vector swapping.
//!
//! The interrupt path only ever receives a [`Platform::Regs`] value, which
//! cannot allocate. Code reachable from an [`IrqHandler`] has no way to get at
//! the allocator.

use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::error::{Error, Result};
use crate::regs::Registers;
use crate::scr::DmaFlags;

/// A block of chip memory handed out by a [`ChipAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipRegion {
    /// CPU-visible address of the block.
    pub ptr: NonNull<u8>,
    /// Address the co-processors use for the same block.
    pub bus: u32,
    pub layout: Layout,
}

/// Allocator for DMA-visible memory.
///
/// # Safety
///
/// A returned region must be valid for reads and writes of `layout.size()`
/// bytes at `ptr`, aligned to `layout.align()`, unaliased until freed, and
/// reachable by the co-processors at `bus`.
pub unsafe trait ChipAllocator {
    fn alloc_chip(&self, layout: Layout) -> Option<ChipRegion>;

    /// # Safety
    ///
    /// `region` must come from this allocator and must not be used afterwards.
    unsafe fn free_chip(&self, region: ChipRegion);
}

/// Owned, zero-initialised array of `T` in chip memory.
pub struct ChipMem<T: Copy, A: ChipAllocator> {
    region: ChipRegion,
    len: usize,
    alloc: A,
    _marker: PhantomData<T>,
}

impl<T: Copy, A: ChipAllocator> ChipMem<T, A> {
    /// Allocate `len` zeroed elements.
    ///
    /// `T` must be valid when all-zero; every user in this crate stores plain
    /// integers or structs of them.
    pub fn zeroed(alloc: A, len: usize) -> Result<Self> {
        let layout = Layout::array::<T>(len.max(1)).map_err(|_| Error::OutOfChipMemory {
            bytes: usize::MAX,
        })?;
        let region = alloc.alloc_chip(layout).ok_or(Error::OutOfChipMemory {
            bytes: layout.size(),
        })?;
        unsafe { core::ptr::write_bytes(region.ptr.as_ptr(), 0, layout.size()) };
        Ok(Self {
            region,
            len,
            alloc,
            _marker: PhantomData,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bus address of the first element.
    #[inline(always)]
    pub fn bus_address(&self) -> u32 {
        self.region.bus
    }

    /// Bus address of element `index`.
    #[inline(always)]
    pub fn bus_address_of(&self, index: usize) -> u32 {
        self.region.bus + (index * core::mem::size_of::<T>()) as u32
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut T {
        self.region.ptr.as_ptr().cast()
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        unsafe { core::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { core::slice::from_raw_parts_mut(self.as_ptr(), self.len) }
    }
}

impl<T: Copy, A: ChipAllocator> Drop for ChipMem<T, A> {
    fn drop(&mut self) {
        unsafe { self.alloc.free_chip(self.region) }
    }
}

/// Interrupt sink registration: a handler function and the context pointer
/// it is called with.
#[derive(Debug, Clone, Copy)]
pub struct IrqHandler {
    pub func: unsafe fn(*const ()),
    pub data: *const (),
}

impl IrqHandler {
    /// Run the handler.
    ///
    /// # Safety
    ///
    /// `data` must still point at whatever `func` expects.
    #[inline(always)]
    pub unsafe fn call(self) {
        unsafe { (self.func)(self.data) }
    }
}

/// Everything the scheduling subsystem needs from the machine.
pub trait Platform: ChipAllocator + Clone {
    /// Register access handed to interrupt context.
    type Regs: Registers + Clone;

    fn registers(&self) -> Self::Regs;

    /// Enable or disable DMA channels, coordinating with the host.
    fn set_dma_bit(&self, bits: DmaFlags, enabled: bool);

    /// Take exclusive ownership of the transfer unit from the host.
    fn lease_transfer_unit(&self);

    /// Hand the transfer unit back to the host.
    fn release_transfer_unit(&self);

    /// Block until the beam reaches the start of the next frame.
    fn wait_for_frame_start(&self);

    /// Install `handler` on the "transfer operation complete" line and return
    /// whatever was installed before.
    ///
    /// # Safety
    ///
    /// The handler's `data` must stay valid until it is swapped out again.
    unsafe fn swap_blit_handler(&self, handler: Option<IrqHandler>) -> Option<IrqHandler>;
}
