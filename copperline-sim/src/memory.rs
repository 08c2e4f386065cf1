//! Chip RAM: the only memory the co-processors can reach.
//!
//! Bus addresses start at [`BUS_BASE`] so a null bus pointer is never valid.
//! Words are stored in host byte order; CPU-side writes through a
//! [`ChipRegion`] pointer and co-processor reads by bus address see the same
//! bytes.

use core::alloc::Layout;
use core::cell::{Cell, RefCell};
use core::ptr::NonNull;

use alloc::boxed::Box;
use alloc::vec;

use copperline::ChipRegion;
use heapless::Vec as RegionTable;
use log::{debug, warn};

/// Bus address of the first byte of chip RAM.
pub const BUS_BASE: u32 = 0x400;

/// Most live allocations the region table tracks.
pub const MAX_REGIONS: usize = 64;

const MAX_ALIGN: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Region {
    offset: usize,
    size: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub live: usize,
    pub bytes_in_use: usize,
    pub peak_bytes: usize,
    pub allocations: usize,
    pub failures: usize,
}

pub struct ChipRam {
    storage: Box<[Cell<u64>]>,
    regions: RefCell<RegionTable<Region, MAX_REGIONS>>,
    stats: Cell<AllocStats>,
}

impl ChipRam {
    pub fn new(bytes: usize) -> Self {
        let words = bytes.div_ceil(8);
        Self {
            storage: vec![Cell::new(0u64); words].into_boxed_slice(),
            regions: RefCell::new(RegionTable::new()),
            stats: Cell::new(AllocStats::default()),
        }
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.storage.len() * 8
    }

    pub fn stats(&self) -> AllocStats {
        self.stats.get()
    }

    #[inline(always)]
    fn base(&self) -> *mut u8 {
        self.storage.as_ptr().cast::<u8>().cast_mut()
    }

    /// First-fit allocation.
    pub fn alloc(&self, layout: Layout) -> Option<ChipRegion> {
        let size = layout.size().max(1);
        let align = layout.align().max(2);
        let mut stats = self.stats.get();

        let placed = if align > MAX_ALIGN {
            None
        } else {
            self.place(size, align)
        };
        let Some(offset) = placed else {
            stats.failures += 1;
            self.stats.set(stats);
            warn!("chip ram exhausted: {} bytes (align {}) requested", size, align);
            return None;
        };

        stats.live += 1;
        stats.allocations += 1;
        stats.bytes_in_use += size;
        stats.peak_bytes = stats.peak_bytes.max(stats.bytes_in_use);
        self.stats.set(stats);

        let bus = BUS_BASE + offset as u32;
        debug!("chip alloc {} bytes at ${:06X}", size, bus);
        // SAFETY: `offset + size` lies inside `storage`.
        let ptr = unsafe { NonNull::new_unchecked(self.base().add(offset)) };
        Some(ChipRegion { ptr, bus, layout })
    }

    fn place(&self, size: usize, align: usize) -> Option<usize> {
        let mut regions = self.regions.borrow_mut();
        if regions.is_full() {
            return None;
        }
        let mut cursor: usize = 0;
        let mut at = regions.len();
        for (i, region) in regions.iter().enumerate() {
            if cursor.next_multiple_of(align) + size <= region.offset {
                at = i;
                break;
            }
            cursor = region.offset + region.size;
        }
        let offset = cursor.next_multiple_of(align);
        if at == regions.len() && offset + size > self.size() {
            return None;
        }
        regions.insert(at, Region { offset, size }).ok()?;
        Some(offset)
    }

    pub fn free(&self, region: ChipRegion) {
        let offset = (region.ptr.as_ptr() as usize).wrapping_sub(self.base() as usize);
        let mut regions = self.regions.borrow_mut();
        let Some(at) = regions.iter().position(|r| r.offset == offset) else {
            warn!("free of unknown chip region at ${:06X}", region.bus);
            return;
        };
        let freed = regions.remove(at);
        let mut stats = self.stats.get();
        stats.live -= 1;
        stats.bytes_in_use -= freed.size;
        self.stats.set(stats);
        debug!("chip free {} bytes at ${:06X}", freed.size, region.bus);
    }

    /// Byte offset of `len` bytes at bus address `bus`, if they are all
    /// inside chip RAM.
    #[inline(always)]
    fn offset_of(&self, bus: u32, len: usize) -> Option<usize> {
        let offset = bus.checked_sub(BUS_BASE)? as usize;
        (offset + len <= self.size()).then_some(offset)
    }

    pub fn read_u16(&self, bus: u32) -> Option<u16> {
        let offset = self.offset_of(bus, 2)?;
        // SAFETY: in bounds; the storage is interior-mutable.
        Some(unsafe { self.base().add(offset).cast::<u16>().read_unaligned() })
    }

    pub fn write_u16(&self, bus: u32, value: u16) -> bool {
        let Some(offset) = self.offset_of(bus, 2) else {
            return false;
        };
        // SAFETY: in bounds; the storage is interior-mutable.
        unsafe { self.base().add(offset).cast::<u16>().write_unaligned(value) };
        true
    }

    pub fn read_u32(&self, bus: u32) -> Option<u32> {
        let offset = self.offset_of(bus, 4)?;
        // SAFETY: in bounds; the storage is interior-mutable.
        Some(unsafe { self.base().add(offset).cast::<u32>().read_unaligned() })
    }

    pub fn write_u32(&self, bus: u32, value: u32) -> bool {
        let Some(offset) = self.offset_of(bus, 4) else {
            return false;
        };
        // SAFETY: in bounds; the storage is interior-mutable.
        unsafe { self.base().add(offset).cast::<u32>().write_unaligned(value) };
        true
    }
}
