//! # Page allocator front-end
//!
//! The kernel allocates through a [`PageAllocator`] from the first
//! instruction on. It starts in bootstrap mode backed by the
//! [`BumpAllocator`]; once the general-purpose allocator is ready,
//! [`set_page_allocator`](PageAllocator::set_page_allocator) hands every
//! request to it and closes the bump allocator for good.

use crate::BumpAllocator;
use mic_addresses::{PhysicalPage, Size4K, VirtualAddress};
use mic_layout::AddressTranslator;
use mic_vmem::FrameAlloc;

bitflags::bitflags! {
    /// Hints passed through to the delegate allocator.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct AllocFlags: u32 {
        /// The caller cannot sleep (interrupt context, spin lock held).
        const ATOMIC = 1 << 0;

        /// The caller wants zero-filled memory.
        const ZERO   = 1 << 1;
    }
}

/// Operations of the general-purpose page allocator.
pub trait PageAllocatorOps: Sync {
    /// Allocate `count` contiguous pages.
    fn alloc_pages(&self, count: usize, flags: AllocFlags) -> Option<VirtualAddress>;

    /// Return `count` pages starting at `pages`.
    fn free_pages(&self, pages: VirtualAddress, count: usize);

    /// Byte-granular allocation, if this allocator offers it.
    fn byte_allocator(&self) -> Option<&dyn ByteAllocator> {
        None
    }
}

/// Optional byte-granular capability of a [`PageAllocatorOps`].
pub trait ByteAllocator {
    fn allocate(&self, size: usize, flags: AllocFlags) -> Option<VirtualAddress>;
    fn free(&self, ptr: VirtualAddress);
}

#[derive(Copy, Clone)]
enum Stage {
    Bootstrap,
    Delegated(&'static dyn PageAllocatorOps),
}

pub struct PageAllocator {
    early: BumpAllocator,
    stage: Stage,
}

impl PageAllocator {
    #[must_use]
    pub const fn new(early: BumpAllocator) -> Self {
        Self {
            early,
            stage: Stage::Bootstrap,
        }
    }

    /// Route all further requests to `ops` and finalize the bump allocator.
    pub fn set_page_allocator(&mut self, ops: &'static dyn PageAllocatorOps) {
        if matches!(self.stage, Stage::Delegated(_)) {
            log::warn!("replacing an already installed page allocator");
        }
        self.early.finalize();
        self.stage = Stage::Delegated(ops);
        log::info!(
            "page allocator installed, early heap ends at {}",
            self.early.cursor()
        );
    }

    #[inline]
    #[must_use]
    pub const fn is_delegated(&self) -> bool {
        matches!(self.stage, Stage::Delegated(_))
    }

    /// Allocate directly from the bump allocator.
    ///
    /// # Panics
    /// After [`set_page_allocator`](Self::set_page_allocator).
    pub fn early_alloc_page(&mut self) -> VirtualAddress {
        self.early.alloc_page()
    }

    /// One page, from whichever allocator is active.
    pub fn alloc_page(&mut self, flags: AllocFlags) -> Option<VirtualAddress> {
        match self.stage {
            Stage::Bootstrap => Some(self.early.alloc_page()),
            Stage::Delegated(ops) => ops.alloc_pages(1, flags),
        }
    }

    /// Bootstrap pages are never returned; freeing one is a no-op.
    pub fn free_page(&mut self, page: VirtualAddress) {
        if let Stage::Delegated(ops) = self.stage {
            ops.free_pages(page, 1);
        }
    }

    /// `count` contiguous pages. Always `None` before delegation.
    pub fn alloc_pages(&mut self, count: usize, flags: AllocFlags) -> Option<VirtualAddress> {
        match self.stage {
            Stage::Bootstrap => None,
            Stage::Delegated(ops) => ops.alloc_pages(count, flags),
        }
    }

    pub fn free_pages(&mut self, pages: VirtualAddress, count: usize) {
        if let Stage::Delegated(ops) = self.stage {
            ops.free_pages(pages, count);
        }
    }

    /// `size` bytes if the delegate is byte-granular, otherwise one page.
    pub fn allocate(&mut self, size: usize, flags: AllocFlags) -> Option<VirtualAddress> {
        if let Stage::Delegated(ops) = self.stage
            && let Some(bytes) = ops.byte_allocator()
        {
            return bytes.allocate(size, flags);
        }
        self.alloc_pages(1, flags)
    }

    /// Counterpart of [`allocate`](Self::allocate).
    pub fn free(&mut self, ptr: VirtualAddress) {
        if let Stage::Delegated(ops) = self.stage
            && let Some(bytes) = ops.byte_allocator()
        {
            bytes.free(ptr);
            return;
        }
        self.free_pages(ptr, 1);
    }

    /// Where the bootstrap heap ends. Stable after delegation.
    #[inline]
    #[must_use]
    pub const fn last_early_heap(&self) -> VirtualAddress {
        self.early.cursor()
    }

    #[inline]
    #[must_use]
    pub const fn translator(&self) -> &AddressTranslator {
        self.early.translator()
    }
}

impl FrameAlloc for PageAllocator {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        let va = self.alloc_page(AllocFlags::empty())?;
        Some(self.translator().virt_to_phys(va).page())
    }
}
