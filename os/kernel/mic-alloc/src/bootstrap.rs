//! # Bootstrap page allocator
//!
//! Hands out 4 KiB pages directly after the kernel image until a real
//! allocator takes over. Pages are never returned. Once
//! [`finalize`](BumpAllocator::finalize)d, any further allocation is a
//! kernel bug and panics.

use mic_addresses::{PageSize, PhysicalPage, Size4K, VirtualAddress};
use mic_layout::AddressTranslator;
use mic_vmem::FrameAlloc;

pub struct BumpAllocator {
    translator: AddressTranslator,
    /// Next page to hand out (straight-map alias).
    cursor: VirtualAddress,
    finalized: bool,
}

impl BumpAllocator {
    /// Start allocating at the first page boundary after `kernel_end`.
    ///
    /// `kernel_end` is usually a text-region address; the cursor is converted
    /// to its straight-map alias so the pages stay reachable once the text
    /// mapping is rebuilt.
    #[must_use]
    pub const fn new(translator: AddressTranslator, kernel_end: VirtualAddress) -> Self {
        let aligned = kernel_end.align_up::<Size4K>();
        let cursor = translator.phys_to_virt(translator.virt_to_phys(aligned));
        Self {
            translator,
            cursor,
            finalized: false,
        }
    }

    /// Hand out the next page.
    ///
    /// # Panics
    /// If the allocator was finalized.
    pub fn alloc_page(&mut self) -> VirtualAddress {
        assert!(
            !self.finalized,
            "early allocator is already finalized, do not use it"
        );
        let page = self.cursor;
        self.cursor += Size4K::SIZE;
        page
    }

    /// Close the allocator. The high-water mark stays available through
    /// [`cursor`](Self::cursor).
    pub const fn finalize(&mut self) {
        self.finalized = true;
    }

    #[inline]
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// One past the last page handed out.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> VirtualAddress {
        self.cursor
    }

    #[inline]
    #[must_use]
    pub const fn translator(&self) -> &AddressTranslator {
        &self.translator
    }
}

impl FrameAlloc for BumpAllocator {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        let va = self.alloc_page();
        Some(self.translator.virt_to_phys(va).page())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mic_addresses::PhysicalAddress;
    use mic_layout::memory::{KERNEL_VIRT_BASE, STRAIGHT_MAP_BASE};

    fn allocator() -> BumpAllocator {
        let t = AddressTranslator::new(PhysicalAddress::new(0x0100_0000));
        BumpAllocator::new(t, VirtualAddress::new(KERNEL_VIRT_BASE + 0x0020_1234))
    }

    #[test]
    fn starts_at_straight_alias_of_aligned_end() {
        let mut b = allocator();
        assert_eq!(b.cursor().as_u64(), STRAIGHT_MAP_BASE + 0x0120_2000);
        assert_eq!(b.alloc_page().as_u64(), STRAIGHT_MAP_BASE + 0x0120_2000);
        assert_eq!(b.alloc_page().as_u64(), STRAIGHT_MAP_BASE + 0x0120_3000);
        assert_eq!(b.cursor().as_u64(), STRAIGHT_MAP_BASE + 0x0120_4000);
    }

    #[test]
    fn frames_are_physical() {
        let mut b = allocator();
        let f = b.alloc_4k().unwrap();
        assert_eq!(f.base().as_u64(), 0x0120_2000);
    }

    #[test]
    fn aligned_end_is_not_bumped() {
        let t = AddressTranslator::new(PhysicalAddress::new(0x0100_0000));
        let b = BumpAllocator::new(t, VirtualAddress::new(KERNEL_VIRT_BASE + 0x0030_0000));
        assert_eq!(b.cursor().as_u64(), STRAIGHT_MAP_BASE + 0x0130_0000);
    }

    #[test]
    #[should_panic(expected = "already finalized")]
    fn alloc_after_finalize_panics() {
        let mut b = allocator();
        b.alloc_page();
        b.finalize();
        let _ = b.alloc_page();
    }

    #[test]
    fn finalize_keeps_high_water_mark() {
        let mut b = allocator();
        b.alloc_page();
        let mark = b.cursor();
        b.finalize();
        assert!(b.is_finalized());
        assert_eq!(b.cursor(), mark);
    }
}
