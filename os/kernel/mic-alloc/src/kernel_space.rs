//! # Kernel address space
//!
//! Builds the kernel's initial page tables and owns them afterwards.
//!
//! ```text
//! L4[0]    ──┐
//!            ├──► shared L3 ──► L2 ──► 2 MiB leaves   (identity + straight map)
//! L4[256]  ──┘
//! L4[0]        ...  L2[0]    ──► 2 MiB leaf 0 → 0    (null guard)
//! L4[511]  ──► L3[509] ──► L2 ──► L1 ──► 4 KiB        (fixed window, on demand)
//!          └─► L3[510] ──► L2 ──► 2 MiB leaves        (kernel text/data)
//! ```

use crate::{MicroArchReservations, ReservationSink};
use mic_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size2M, Size4K, VirtualAddress,
};
use mic_layout::memory::{
    AP_TRAMPOLINE, AP_TRAMPOLINE_SIZE, FIXED_WINDOW_BASE, KERNEL_VIRT_BASE, STRAIGHT_MAP_BASE,
};
use mic_layout::{AddressTranslator, BootParameters};
use mic_sync::SpinMutex;
use mic_vmem::{AddressSpace, FrameAlloc, MapError, Mapping, PageAttributes, PhysMapper, RootRegister};

/// A [`KernelSpace`] shared between CPUs.
pub type SharedKernelSpace<'m, M, R> = SpinMutex<KernelSpace<'m, M, R>>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum KernelSpaceError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error("kernel image {start}..{end} does not lie in the text region")]
    KernelOutsideTextRegion {
        start: VirtualAddress,
        end: VirtualAddress,
    },

    #[error("fixed window exhausted mapping {size:#x} bytes at {phys}")]
    FixedWindowExhausted { phys: PhysicalAddress, size: u64 },
}

pub struct KernelSpace<'m, M: PhysMapper, R: RootRegister> {
    space: AddressSpace<'m, M>,
    mapper: &'m M,
    translator: AddressTranslator,
    params: BootParameters,
    fixed_cursor: VirtualAddress,
    root_register: R,
}

impl<'m, M: PhysMapper, R: RootRegister> KernelSpace<'m, M, R> {
    /// Build the initial kernel address space and make it active.
    ///
    /// Every table comes from `alloc`, which at this point is the bootstrap
    /// allocator.
    ///
    /// # Errors
    /// [`KernelSpaceError::KernelOutsideTextRegion`] for an image that is not
    /// linked at [`KERNEL_VIRT_BASE`], or any [`MapError`] raised while
    /// building the tables.
    pub fn build<A: FrameAlloc>(
        mapper: &'m M,
        alloc: &mut A,
        params: BootParameters,
        root_register: R,
    ) -> Result<Self, KernelSpaceError> {
        if params.kernel_start.as_u64() < KERNEL_VIRT_BASE
            || params.kernel_end.as_u64() < params.kernel_start.as_u64()
        {
            return Err(KernelSpaceError::KernelOutsideTextRegion {
                start: params.kernel_start,
                end: params.kernel_end,
            });
        }

        let space = AddressSpace::new(mapper, alloc)?;
        let mut ks = Self {
            space,
            mapper,
            translator: AddressTranslator::new(params.kernel_phys_base),
            params,
            fixed_cursor: VirtualAddress::new(FIXED_WINDOW_BASE),
            root_register,
        };

        ks.init_direct_map(alloc)?;
        ks.init_low_area(alloc)?;
        ks.init_text_area(alloc)?;
        ks.reload();

        log::info!("page table is now at {}", ks.space.root_page());
        Ok(ks)
    }

    /// Straight map and identity alias of `[map_start, map_end)`.
    fn init_direct_map<A: FrameAlloc>(&mut self, alloc: &mut A) -> Result<(), MapError> {
        let aliases = [
            VirtualAddress::new(STRAIGHT_MAP_BASE),
            VirtualAddress::new(0),
        ];
        let count = self.space.link_direct_map(
            alloc,
            self.params.map_start,
            self.params.map_end,
            &aliases,
        )?;
        log::info!(
            "straight map {}..{}: {count} large pages",
            self.params.map_start,
            self.params.map_end
        );
        Ok(())
    }

    /// 2 MiB at `0 → 0`. Coincides with the identity alias when the direct
    /// map starts at zero.
    fn init_low_area<A: FrameAlloc>(&mut self, alloc: &mut A) -> Result<(), MapError> {
        self.space.set_page(
            alloc,
            VirtualAddress::new(0),
            PhysicalAddress::new(0),
            PageAttributes::KERNEL_LARGE,
        )
    }

    /// Kernel text and data with 2 MiB pages, one spare large page past the end.
    fn init_text_area<A: FrameAlloc>(&mut self, alloc: &mut A) -> Result<(), MapError> {
        let end = (self.params.kernel_end + Size2M::SIZE).align_up::<Size2M>();
        let pages = (end.as_u64() - KERNEL_VIRT_BASE) >> Size2M::SHIFT;
        log::info!("# of large pages = {pages}");

        let virt = VirtualAddress::new(KERNEL_VIRT_BASE).page::<Size2M>();
        let phys = self.params.kernel_phys_base.page::<Size2M>();
        for i in 0..pages {
            self.space.set_page(
                alloc,
                virt.forward(i).base(),
                phys.forward(i).base(),
                PageAttributes::KERNEL_LARGE,
            )?;
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.space.root_page()
    }

    #[inline]
    #[must_use]
    pub const fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    /// Next unused address of the fixed window.
    #[inline]
    #[must_use]
    pub const fn fixed_cursor(&self) -> VirtualAddress {
        self.fixed_cursor
    }

    #[inline]
    #[must_use]
    pub const fn root_register(&self) -> &R {
        &self.root_register
    }

    fn space_for(&self, table: Option<PhysicalPage<Size4K>>) -> AddressSpace<'m, M> {
        AddressSpace::from_root(self.mapper, table.unwrap_or_else(|| self.space.root_page()))
    }

    /// Map one page in `table`, or in the kernel table if `None`.
    ///
    /// # Errors
    /// See [`AddressSpace::set_page`].
    pub fn set_page<A: FrameAlloc>(
        &mut self,
        table: Option<PhysicalPage<Size4K>>,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        attrs: PageAttributes,
    ) -> Result<(), MapError> {
        match table {
            None => self.space.set_page(alloc, va, pa, attrs),
            Some(_) => self.space_for(table).set_page(alloc, va, pa, attrs),
        }
    }

    /// Unmap one page in `table`, or in the kernel table if `None`.
    ///
    /// # Errors
    /// See [`AddressSpace::clear_page`].
    pub fn clear_page(
        &mut self,
        table: Option<PhysicalPage<Size4K>>,
        va: VirtualAddress,
        large: bool,
    ) -> Result<(), MapError> {
        match table {
            None => self.space.clear_page(va, large),
            Some(_) => self.space_for(table).clear_page(va, large),
        }
    }

    /// Look up `va` in the kernel table.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<Mapping> {
        self.space.query(va)
    }

    /// Map `[phys, phys + size)` at the next free addresses of the fixed
    /// window, writable and optionally uncacheable, then reload the kernel
    /// table. Returns the address that corresponds to `phys` itself.
    ///
    /// # Errors
    /// [`KernelSpaceError::FixedWindowExhausted`] if the window would run into
    /// the kernel text region, or any [`MapError`]. Pages mapped before a
    /// failure stay mapped and their addresses are not reused.
    pub fn map_fixed_window<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        phys: PhysicalAddress,
        size: u64,
        uncacheable: bool,
    ) -> Result<VirtualAddress, KernelSpaceError> {
        let offset = phys.offset::<Size4K>().as_u64();
        let first = phys.page::<Size4K>();
        let base = self.fixed_cursor;

        let pages = offset
            .checked_add(size)
            .map(|bytes| bytes.div_ceil(Size4K::SIZE))
            .filter(|pages| {
                pages
                    .checked_mul(Size4K::SIZE)
                    .and_then(|len| base.checked_add(len))
                    .is_some_and(|end| end.as_u64() <= KERNEL_VIRT_BASE)
            })
            .ok_or(KernelSpaceError::FixedWindowExhausted { phys, size })?;

        let attrs = if uncacheable {
            PageAttributes::DEVICE
        } else {
            PageAttributes::WRITABLE
        };

        log::debug!("map_fixed: {} => {base} ({pages} pages)", first.base());
        for i in 0..pages {
            self.space
                .set_page(alloc, self.fixed_cursor, first.forward(i).base(), attrs)?;
            self.fixed_cursor += Size4K::SIZE;
        }

        self.reload();
        Ok(base + offset)
    }

    /// Make the kernel table active again, flushing stale translations.
    pub fn reload(&mut self) {
        // SAFETY: the kernel table always maps the kernel image, the
        // straight map and the low area, which is everything that runs here.
        unsafe { self.root_register.load(self.space.root_page()) }
    }

    /// Make `table` active, or the kernel table if `None`.
    ///
    /// # Safety
    /// A caller-provided table must map the kernel the same way the kernel
    /// table does.
    pub unsafe fn load_page_table(&mut self, table: Option<PhysicalPage<Size4K>>) {
        match table {
            None => self.reload(),
            Some(root) => unsafe { self.root_register.load(root) },
        }
    }

    /// Report every physical range the general-purpose allocator must leave
    /// alone: the kernel image with the bootstrap heap, the AP trampoline and
    /// the zero page, followed by whatever `arch` adds for `[start, end)`.
    pub fn reserve_arch_pages(
        &self,
        start: PhysicalAddress,
        end: PhysicalAddress,
        last_early_heap: VirtualAddress,
        arch: &mut impl MicroArchReservations,
        sink: &mut impl ReservationSink,
    ) {
        let t = &self.translator;
        sink.reserve(t.virt_to_phys(self.params.kernel_start)..t.virt_to_phys(last_early_heap));
        sink.reserve(
            PhysicalAddress::new(AP_TRAMPOLINE)
                ..PhysicalAddress::new(AP_TRAMPOLINE + AP_TRAMPOLINE_SIZE),
        );
        sink.reserve(PhysicalAddress::new(0)..PhysicalAddress::new(Size4K::SIZE));
        arch.reserve_arch_pages(start, end, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mic_vmem::testing::{FrameArena, RecordingRoot};
    use crate::{BumpAllocator, NoMicroArchReservations};
    use core::ops::Range;
    use mic_vmem::LeafSize;
    use std::vec::Vec;

    const KERNEL_PHYS: u64 = 0x0100_0000;
    const MAP_END: u64 = 0x0400_0000;

    fn params() -> BootParameters {
        BootParameters {
            kernel_phys_base: PhysicalAddress::new(KERNEL_PHYS),
            kernel_start: VirtualAddress::new(KERNEL_VIRT_BASE),
            kernel_end: VirtualAddress::new(KERNEL_VIRT_BASE + 0x0030_0800),
            map_start: PhysicalAddress::new(0),
            map_end: PhysicalAddress::new(MAP_END),
        }
    }

    fn bump() -> BumpAllocator {
        let p = params();
        BumpAllocator::new(AddressTranslator::new(p.kernel_phys_base), p.kernel_end)
    }

    fn build<'m>(
        arena: &'m FrameArena,
        alloc: &mut BumpAllocator,
    ) -> KernelSpace<'m, FrameArena, RecordingRoot> {
        KernelSpace::build(arena, alloc, params(), RecordingRoot::default()).unwrap()
    }

    #[test]
    fn build_maps_every_region_and_loads_root() {
        let arena = FrameArena::default();
        let mut alloc = bump();
        let ks = build(&arena, &mut alloc);

        // Straight map and identity alias agree.
        for pa in [0, 0x0020_0000, MAP_END - 0x0020_0000] {
            let s = ks.query(VirtualAddress::new(STRAIGHT_MAP_BASE + pa)).unwrap();
            let i = ks.query(VirtualAddress::new(pa)).unwrap();
            assert_eq!(s.phys.as_u64(), pa);
            assert_eq!(s, i);
            assert_eq!(s.size, LeafSize::Size2M);
        }
        assert!(ks.query(VirtualAddress::new(STRAIGHT_MAP_BASE + MAP_END)).is_none());

        // Text: end = 0x30_0800 -> align_up(end + 2 MiB) = 6 MiB -> 3 large pages.
        for i in 0..3 {
            let m = ks.query(VirtualAddress::new(KERNEL_VIRT_BASE + i * 0x0020_0000)).unwrap();
            assert_eq!(m.phys.as_u64(), KERNEL_PHYS + i * 0x0020_0000);
            assert_eq!(m.attributes, PageAttributes::KERNEL_LARGE);
        }
        assert!(ks.query(VirtualAddress::new(KERNEL_VIRT_BASE + 0x0060_0000)).is_none());

        // Null guard.
        assert_eq!(ks.query(VirtualAddress::new(0x10)).unwrap().phys.as_u64(), 0x10);

        // Fixed window reserved but empty.
        assert_eq!(ks.fixed_cursor().as_u64(), FIXED_WINDOW_BASE);
        assert!(ks.query(ks.fixed_cursor()).is_none());

        // root, shared L3 + L2 for the direct map, L3 + L2 for the text.
        assert_eq!(
            alloc.cursor().as_u64(),
            STRAIGHT_MAP_BASE + KERNEL_PHYS + 0x0030_1000 + 5 * 4096
        );
        assert_eq!(ks.root_register().loads, [ks.root_page()]);
    }

    #[test]
    fn build_rejects_kernel_below_text_region() {
        let arena = FrameArena::default();
        let mut alloc = bump();
        let mut p = params();
        p.kernel_start = VirtualAddress::new(STRAIGHT_MAP_BASE);
        let err = KernelSpace::build(&arena, &mut alloc, p, RecordingRoot::default())
            .err()
            .unwrap();
        assert!(matches!(err, KernelSpaceError::KernelOutsideTextRegion { .. }));
    }

    #[test]
    fn fixed_window_is_append_only() {
        let arena = FrameArena::default();
        let mut alloc = bump();
        let mut ks = build(&arena, &mut alloc);

        let a = ks
            .map_fixed_window(&mut alloc, PhysicalAddress::new(0xfee0_0020), 0x10, true)
            .unwrap();
        assert_eq!(a.as_u64(), FIXED_WINDOW_BASE + 0x20);
        let m = ks.query(a).unwrap();
        assert_eq!(m.phys.as_u64(), 0xfee0_0020);
        assert_eq!(m.attributes, PageAttributes::DEVICE);
        assert_eq!(m.size, LeafSize::Size4K);

        // Straddles a page boundary: two pages.
        let b = ks
            .map_fixed_window(&mut alloc, PhysicalAddress::new(0x8000_0ff0), 0x20, false)
            .unwrap();
        assert_eq!(b.as_u64(), FIXED_WINDOW_BASE + 0x1000 + 0xff0);
        assert_eq!(
            ks.query(b + 0x10).unwrap().phys.as_u64(),
            0x8000_1000
        );
        assert_eq!(ks.query(b).unwrap().attributes, PageAttributes::WRITABLE);
        assert_eq!(ks.fixed_cursor().as_u64(), FIXED_WINDOW_BASE + 0x3000);

        // Each mapping reloads the table.
        assert_eq!(ks.root_register().loads.len(), 3);
    }

    #[test]
    fn fixed_window_cannot_reach_text() {
        let arena = FrameArena::default();
        let mut alloc = bump();
        let mut ks = build(&arena, &mut alloc);

        let size = KERNEL_VIRT_BASE - FIXED_WINDOW_BASE + 1;
        let err = ks
            .map_fixed_window(&mut alloc, PhysicalAddress::new(0), size, false)
            .unwrap_err();
        assert!(matches!(err, KernelSpaceError::FixedWindowExhausted { .. }));
        assert_eq!(ks.fixed_cursor().as_u64(), FIXED_WINDOW_BASE);
    }

    #[test]
    fn fixed_window_rejects_sizes_that_overflow() {
        let arena = FrameArena::default();
        let mut alloc = bump();
        let mut ks = build(&arena, &mut alloc);
        let loads = ks.root_register().loads.len();

        for (phys, size) in [(0, u64::MAX), (0x20, u64::MAX - 0x10), (0xfff, u64::MAX)] {
            let err = ks
                .map_fixed_window(&mut alloc, PhysicalAddress::new(phys), size, false)
                .unwrap_err();
            assert_eq!(
                err,
                KernelSpaceError::FixedWindowExhausted {
                    phys: PhysicalAddress::new(phys),
                    size
                }
            );
        }
        assert_eq!(ks.fixed_cursor().as_u64(), FIXED_WINDOW_BASE);
        assert_eq!(ks.root_register().loads.len(), loads);

        // The window is still usable afterwards.
        let va = ks
            .map_fixed_window(&mut alloc, PhysicalAddress::new(0x4000), 8, true)
            .unwrap();
        assert_eq!(va.as_u64(), FIXED_WINDOW_BASE);
    }

    #[test]
    fn set_and_clear_in_kernel_table() {
        let arena = FrameArena::default();
        let mut alloc = bump();
        let mut ks = build(&arena, &mut alloc);

        let va = VirtualAddress::new(0xffff_c000_0000_0000);
        ks.set_page(None, &mut alloc, va, PhysicalAddress::new(0x5000), PageAttributes::WRITABLE)
            .unwrap();
        assert_eq!(ks.query(va).unwrap().phys.as_u64(), 0x5000);

        // The straight map cannot be silently redirected.
        let err = ks
            .set_page(
                None,
                &mut alloc,
                VirtualAddress::new(STRAIGHT_MAP_BASE),
                PhysicalAddress::new(0x0020_0000),
                PageAttributes::KERNEL_LARGE,
            )
            .unwrap_err();
        assert!(matches!(err, MapError::Conflict { .. }));

        ks.clear_page(None, va, false).unwrap();
        assert!(ks.query(va).is_none());
        assert_eq!(ks.clear_page(None, va, false), Err(MapError::NotMapped(va)));
    }

    #[test]
    fn explicit_table_is_independent() {
        let arena = FrameArena::default();
        let mut alloc = bump();
        let mut ks = build(&arena, &mut alloc);

        let other = AddressSpace::new(&arena, &mut alloc).unwrap().root_page();
        let va = VirtualAddress::new(0x0000_7000_0000_0000);
        ks.set_page(
            Some(other),
            &mut alloc,
            va,
            PhysicalAddress::new(0x9000),
            PageAttributes::WRITABLE | PageAttributes::USER,
        )
        .unwrap();

        assert!(ks.query(va).is_none());
        let view = AddressSpace::from_root(&arena, other);
        assert_eq!(view.query(va).unwrap().phys.as_u64(), 0x9000);

        unsafe { ks.load_page_table(Some(other)) };
        unsafe { ks.load_page_table(None) };
        assert_eq!(
            ks.root_register().loads,
            [ks.root_page(), other, ks.root_page()]
        );

        ks.clear_page(Some(other), va, false).unwrap();
        assert!(view.query(va).is_none());
    }

    #[test]
    fn reservations_in_order() {
        struct Mailbox;
        impl MicroArchReservations for Mailbox {
            fn reserve_arch_pages(
                &mut self,
                start: PhysicalAddress,
                _end: PhysicalAddress,
                sink: &mut dyn ReservationSink,
            ) {
                sink.reserve(start..start + 0x1000);
            }
        }

        let arena = FrameArena::default();
        let mut alloc = bump();
        let ks = build(&arena, &mut alloc);
        let heap_end = alloc.cursor();

        let mut seen: Vec<Range<u64>> = Vec::new();
        let mut sink = |r: Range<PhysicalAddress>| seen.push(r.start.as_u64()..r.end.as_u64());
        ks.reserve_arch_pages(
            PhysicalAddress::new(0x0800_0000),
            PhysicalAddress::new(0x1000_0000),
            heap_end,
            &mut Mailbox,
            &mut sink,
        );

        assert_eq!(
            seen,
            [
                KERNEL_PHYS..KERNEL_PHYS + 0x0030_1000 + 5 * 4096,
                AP_TRAMPOLINE..AP_TRAMPOLINE + AP_TRAMPOLINE_SIZE,
                0..4096,
                0x0800_0000..0x0800_1000,
            ]
        );

        let mut count = 0;
        ks.reserve_arch_pages(
            PhysicalAddress::new(0),
            PhysicalAddress::new(0),
            heap_end,
            &mut NoMicroArchReservations,
            &mut |_: Range<PhysicalAddress>| count += 1,
        );
        assert_eq!(count, 3);
    }

    #[test]
    fn shared_kernel_space_locks() {
        let arena = FrameArena::default();
        let mut alloc = bump();
        let shared: SharedKernelSpace<'_, _, _> = SpinMutex::new(build(&arena, &mut alloc));

        let va = {
            let mut ks = shared.lock();
            ks.map_fixed_window(&mut alloc, PhysicalAddress::new(0x3000), 8, true)
                .unwrap()
        };
        assert!(shared.lock().query(va).is_some());
    }
}
