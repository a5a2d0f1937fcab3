//! In-memory stand-ins for physical memory and the root register.

use crate::{FrameAlloc, PageTable, PhysMapper, RootRegister};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cell::RefCell;
use mic_addresses::{PhysicalAddress, PhysicalPage, Size4K};

#[repr(C, align(4096))]
struct Frame([u8; 4096]);

/// Physical memory that materializes zeroed 4 KiB frames on first touch.
#[derive(Default)]
pub struct FrameArena {
    frames: RefCell<BTreeMap<u64, Box<Frame>>>,
}

impl FrameArena {
    #[must_use]
    pub fn table(&self, page: PhysicalPage<Size4K>) -> &PageTable {
        // SAFETY: arena frames stay allocated for the arena's lifetime.
        unsafe { self.table_mut(page) }
    }
}

impl PhysMapper for FrameArena {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let base = pa.align_down::<Size4K>().as_u64();
        let off = (pa.as_u64() - base) as usize;
        let mut frames = self.frames.borrow_mut();
        let frame = frames
            .entry(base)
            .or_insert_with(|| Box::new(Frame([0; 4096])));
        let ptr: *mut u8 = frame.0.as_mut_ptr();
        // Boxed frames never move, so the pointer outlives the borrow.
        unsafe { &mut *ptr.add(off).cast::<T>() }
    }
}

/// Hands out consecutive frames from a high physical range.
pub struct ScratchAlloc {
    next: u64,
    limit: usize,
    allocated: usize,
}

impl Default for ScratchAlloc {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl ScratchAlloc {
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            next: 0x10_0000_0000,
            limit,
            allocated: 0,
        }
    }

    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }
}

impl FrameAlloc for ScratchAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.allocated == self.limit {
            return None;
        }
        let page = PhysicalAddress::new(self.next).page();
        self.next += 4096;
        self.allocated += 1;
        Some(page)
    }
}

/// Remembers every root it was asked to load.
#[derive(Default)]
pub struct RecordingRoot {
    pub loads: Vec<PhysicalPage<Size4K>>,
}

impl RootRegister for RecordingRoot {
    unsafe fn load(&mut self, root: PhysicalPage<Size4K>) {
        self.loads.push(root);
    }
}
