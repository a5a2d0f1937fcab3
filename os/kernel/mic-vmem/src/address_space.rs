//! # Address Space (x86-64, L4-rooted)
//!
//! [`AddressSpace`] owns one page-table tree and mutates it through a
//! [`PhysMapper`]. Missing intermediate tables come from a [`FrameAlloc`] and
//! are zeroed before they are linked. Tables are never freed.
//!
//! ## Remap rules
//!
//! | Slot holds                         | Result                              |
//! |:-----------------------------------|:------------------------------------|
//! | nothing                            | mapped                              |
//! | same phys, same attributes         | `Ok(())`, nothing written           |
//! | same phys, different attributes    | [`MapError::AttributeMismatch`]     |
//! | different phys, or wrong entry kind| [`MapError::Conflict`]              |
//!
//! ## Safety
//!
//! Changing a live mapping requires TLB maintenance; callers reload the root
//! through [`activate`](AddressSpace::activate) after batches of changes.

use crate::{
    EntryKind, FrameAlloc, LeafSize, Level, MapError, PageAttributes, PageEntry, PageTable,
    PhysMapper, RootRegister,
};
use mic_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size2M, Size4K, Size512G, VirtualAddress,
};

/// The result of a successful [`AddressSpace::query`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Mapping {
    /// Physical address `va` translates to (leaf base plus in-page offset).
    pub phys: PhysicalAddress,
    /// Attributes of the leaf.
    pub attributes: PageAttributes,
    /// Span of the leaf.
    pub size: LeafSize,
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Allocate and zero a fresh root table.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if `alloc` is exhausted.
    pub fn new<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, MapError> {
        let root = alloc.alloc_4k().ok_or(MapError::OutOfMemory)?;
        let mut space = Self { root, mapper };
        space.table_mut(root).zero();
        Ok(space)
    }

    /// Wrap an existing root table.
    #[inline]
    #[must_use]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the L4 table.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    /// Load this space's root through `reg`.
    ///
    /// # Safety
    /// See [`RootRegister::load`].
    #[inline]
    pub unsafe fn activate<R: RootRegister>(&self, reg: &mut R) {
        unsafe { reg.load(self.root) }
    }

    #[inline]
    fn table(&self, page: PhysicalPage<Size4K>) -> &PageTable {
        unsafe { self.mapper.table_mut(page) }
    }

    #[inline]
    fn table_mut(&mut self, page: PhysicalPage<Size4K>) -> &mut PageTable {
        unsafe { self.mapper.table_mut(page) }
    }

    /// Map `va → pa` with `attrs`.
    ///
    /// With [`PageAttributes::LARGE`] both addresses must be 2 MiB-aligned and
    /// the walk stops at L2; otherwise they must be 4 KiB-aligned.
    ///
    /// # Errors
    /// See the remap rules in the module docs, plus [`MapError::OutOfMemory`]
    /// when an intermediate table cannot be allocated.
    pub fn set_page<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        attrs: PageAttributes,
    ) -> Result<(), MapError> {
        let user = attrs.contains(PageAttributes::USER);
        if attrs.is_large() {
            debug_assert!(va.is_aligned::<Size2M>(), "virtual address not 2 MiB-aligned");
            debug_assert!(pa.is_aligned::<Size2M>(), "physical address not 2 MiB-aligned");
        } else {
            debug_assert!(va.is_aligned::<Size4K>(), "virtual address not 4 KiB-aligned");
            debug_assert!(pa.is_aligned::<Size4K>(), "physical address not 4 KiB-aligned");
        }

        let l3 = self.ensure_next(alloc, self.root, Level::L4, va, user)?;
        let l2 = self.ensure_next(alloc, l3, Level::L3, va, user)?;
        if attrs.is_large() {
            return self.install_leaf(l2, Level::L2, va, pa, attrs);
        }
        let l1 = self.ensure_next(alloc, l2, Level::L2, va, user)?;
        self.install_leaf(l1, Level::L1, va, pa, attrs)
    }

    /// Remove the leaf that maps `va`. Tables are left in place.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] if any level on the walk, or the leaf itself,
    /// is absent, or if the leaf is not of the requested size.
    pub fn clear_page(&mut self, va: VirtualAddress, large: bool) -> Result<(), MapError> {
        let l3 = self.next_table(self.root, Level::L4, va)?;
        let l2 = self.next_table(l3, Level::L3, va)?;

        let (table, level, size) = if large {
            (l2, Level::L2, LeafSize::Size2M)
        } else {
            (self.next_table(l2, Level::L2, va)?, Level::L1, LeafSize::Size4K)
        };

        let idx = level.index(va);
        let t = self.table_mut(table);
        match t.get(idx).kind(level) {
            EntryKind::Leaf { size: s, .. } if s == size => {
                t.set(idx, PageEntry::zero());
                Ok(())
            }
            _ => Err(MapError::NotMapped(va)),
        }
    }

    /// Translate `va` if mapped.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<Mapping> {
        let mut table = self.root;
        for level in [Level::L4, Level::L3, Level::L2, Level::L1] {
            let e = self.table(table).get(level.index(va));
            match e.kind(level) {
                EntryKind::Absent => return None,
                EntryKind::NextTable(next) => table = next,
                EntryKind::Leaf { base, size } => {
                    let offset = va.as_u64() & (size.bytes() - 1);
                    return Some(Mapping {
                        phys: base + offset,
                        attributes: e.attributes(level),
                        size,
                    });
                }
            }
        }
        None
    }

    /// Map the physical range `[start, end)` with writable 2 MiB leaves at
    /// every base in `aliases` (`va = alias + pa`).
    ///
    /// All aliases share one set of L3 tables: the first alias allocates, the
    /// others link their L4 slots to the same L3. Aliases must therefore be
    /// 512 GiB-aligned. Returns the number of large pages mapped.
    ///
    /// # Errors
    /// [`MapError::Conflict`] if an alias' L4 slot already points elsewhere or
    /// a 2 MiB slot is taken, [`MapError::OutOfMemory`] on allocation failure.
    pub fn link_direct_map<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        start: PhysicalAddress,
        end: PhysicalAddress,
        aliases: &[VirtualAddress],
    ) -> Result<u64, MapError> {
        let Some((&primary, others)) = aliases.split_first() else {
            return Ok(0);
        };
        debug_assert!(aliases.iter().all(|a| a.is_aligned::<Size512G>()));

        let mut pa = start.align_down::<Size2M>();
        let mut count = 0;
        while pa < end {
            let va = primary + pa.as_u64();
            let l3 = self.ensure_next(alloc, self.root, Level::L4, va, false)?;
            for &alias in others {
                self.share_l3(alias + pa.as_u64(), l3)?;
            }
            let l2 = self.ensure_next(alloc, l3, Level::L3, va, false)?;
            self.install_leaf(l2, Level::L2, va, pa, PageAttributes::KERNEL_LARGE)?;

            pa += Size2M::SIZE;
            count += 1;
        }

        log::trace!(
            "direct map {start}..{end} at {} alias(es): {count} large pages",
            aliases.len()
        );
        Ok(count)
    }

    /// Point the L4 slot of `va` at the existing L3 table `l3`.
    fn share_l3(&mut self, va: VirtualAddress, l3: PhysicalPage<Size4K>) -> Result<(), MapError> {
        let idx = Level::L4.index(va);
        let root = self.root;
        let t = self.table_mut(root);
        match t.get(idx).kind(Level::L4) {
            EntryKind::Absent => {
                t.set(idx, PageEntry::make_next(l3, false));
                Ok(())
            }
            EntryKind::NextTable(next) if next == l3 => Ok(()),
            EntryKind::NextTable(next) => Err(MapError::Conflict {
                va,
                level: Level::L4,
                existing: next.base(),
            }),
            EntryKind::Leaf { base, .. } => Err(MapError::Conflict {
                va,
                level: Level::L4,
                existing: base,
            }),
        }
    }

    /// Follow the entry for `va` in `table` (at `level`) to the next table,
    /// creating it if absent.
    fn ensure_next<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        table: PhysicalPage<Size4K>,
        level: Level,
        va: VirtualAddress,
        user: bool,
    ) -> Result<PhysicalPage<Size4K>, MapError> {
        let idx = level.index(va);
        let e = self.table(table).get(idx);
        match e.kind(level) {
            EntryKind::NextTable(next) => {
                if user && !e.user() {
                    self.table_mut(table).set(idx, e.with_user(true));
                }
                Ok(next)
            }
            EntryKind::Absent => {
                let next = alloc.alloc_4k().ok_or(MapError::OutOfMemory)?;
                self.table_mut(next).zero();
                self.table_mut(table).set(idx, PageEntry::make_next(next, user));
                Ok(next)
            }
            EntryKind::Leaf { base, .. } => Err(MapError::Conflict {
                va,
                level,
                existing: base,
            }),
        }
    }

    /// Follow the entry for `va` without allocating.
    fn next_table(
        &self,
        table: PhysicalPage<Size4K>,
        level: Level,
        va: VirtualAddress,
    ) -> Result<PhysicalPage<Size4K>, MapError> {
        match self.table(table).get(level.index(va)).kind(level) {
            EntryKind::NextTable(next) => Ok(next),
            EntryKind::Absent | EntryKind::Leaf { .. } => Err(MapError::NotMapped(va)),
        }
    }

    fn install_leaf(
        &mut self,
        table: PhysicalPage<Size4K>,
        level: Level,
        va: VirtualAddress,
        pa: PhysicalAddress,
        attrs: PageAttributes,
    ) -> Result<(), MapError> {
        let idx = level.index(va);
        let t = self.table_mut(table);
        let e = t.get(idx);
        match e.kind(level) {
            EntryKind::Absent => {
                let leaf = match level {
                    Level::L2 => PageEntry::make_2m(pa.page(), attrs),
                    _ => PageEntry::make_4k(pa.page(), attrs),
                };
                t.set(idx, leaf);
                Ok(())
            }
            EntryKind::Leaf { base, .. } if base == pa => {
                let existing = e.attributes(level);
                if existing == attrs {
                    Ok(())
                } else {
                    Err(MapError::AttributeMismatch {
                        va,
                        existing,
                        requested: attrs,
                    })
                }
            }
            EntryKind::Leaf { base: existing, .. } => Err(MapError::Conflict { va, level, existing }),
            EntryKind::NextTable(next) => Err(MapError::Conflict {
                va,
                level,
                existing: next.base(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FrameArena, RecordingRoot, ScratchAlloc};
    use mic_addresses::Size1G;

    const STRAIGHT: u64 = 0xffff_8000_0000_0000;

    fn space<'a>(arena: &'a FrameArena, alloc: &mut ScratchAlloc) -> AddressSpace<'a, FrameArena> {
        AddressSpace::new(arena, alloc).unwrap()
    }

    #[test]
    fn set_then_query_4k() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0xffff_ffff_7000_1000);
        let pa = PhysicalAddress::new(0xfee0_0000);
        aspace
            .set_page(&mut alloc, va, pa, PageAttributes::DEVICE)
            .unwrap();

        let m = aspace.query(va).unwrap();
        assert_eq!(m.phys, pa);
        assert_eq!(m.attributes, PageAttributes::DEVICE);
        assert_eq!(m.size, LeafSize::Size4K);

        // root + L3 + L2 + L1
        assert_eq!(alloc.allocated(), 4);
        assert_eq!(aspace.query(va + 0x123).unwrap().phys, pa + 0x123);
        assert!(aspace.query(va + 0x1000).is_none());
    }

    #[test]
    fn set_then_query_2m() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0xffff_ffff_8000_0000);
        let pa = PhysicalAddress::new(0x0400_0000);
        aspace
            .set_page(&mut alloc, va, pa, PageAttributes::KERNEL_LARGE)
            .unwrap();

        let m = aspace.query(va + 0x1_2345).unwrap();
        assert_eq!(m.phys, pa + 0x1_2345);
        assert_eq!(m.attributes, PageAttributes::KERNEL_LARGE);
        assert_eq!(m.size, LeafSize::Size2M);
        // root + L3 + L2, no L1 for a large leaf
        assert_eq!(alloc.allocated(), 3);
    }

    #[test]
    fn identical_remap_is_a_no_op() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0x0000_0000_0020_0000);
        let pa = PhysicalAddress::new(0x0020_0000);
        aspace
            .set_page(&mut alloc, va, pa, PageAttributes::WRITABLE)
            .unwrap();
        let before = alloc.allocated();
        let snapshot = aspace.query(va);

        aspace
            .set_page(&mut alloc, va, pa, PageAttributes::WRITABLE)
            .unwrap();
        assert_eq!(alloc.allocated(), before);
        assert_eq!(aspace.query(va), snapshot);
    }

    #[test]
    fn remap_to_other_phys_conflicts() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0xffff_8000_0010_0000);
        let p1 = PhysicalAddress::new(0x0010_0000);
        let p2 = PhysicalAddress::new(0x0011_0000);
        aspace
            .set_page(&mut alloc, va, p1, PageAttributes::WRITABLE)
            .unwrap();

        let err = aspace
            .set_page(&mut alloc, va, p2, PageAttributes::WRITABLE)
            .unwrap_err();
        assert_eq!(
            err,
            MapError::Conflict {
                va,
                level: Level::L1,
                existing: p1
            }
        );
        assert_eq!(aspace.query(va).unwrap().phys, p1);
    }

    #[test]
    fn remap_with_other_attributes_is_rejected() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0xffff_8000_0010_0000);
        let pa = PhysicalAddress::new(0x0010_0000);
        aspace
            .set_page(&mut alloc, va, pa, PageAttributes::WRITABLE)
            .unwrap();

        let err = aspace
            .set_page(&mut alloc, va, pa, PageAttributes::DEVICE)
            .unwrap_err();
        assert_eq!(
            err,
            MapError::AttributeMismatch {
                va,
                existing: PageAttributes::WRITABLE,
                requested: PageAttributes::DEVICE
            }
        );
    }

    #[test]
    fn small_page_under_large_leaf_conflicts() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0xffff_8000_0020_0000);
        aspace
            .set_page(
                &mut alloc,
                va,
                PhysicalAddress::new(0x0020_0000),
                PageAttributes::KERNEL_LARGE,
            )
            .unwrap();

        let err = aspace
            .set_page(
                &mut alloc,
                va + 0x1000,
                PhysicalAddress::new(0x0020_1000),
                PageAttributes::WRITABLE,
            )
            .unwrap_err();
        assert!(matches!(err, MapError::Conflict { level: Level::L2, .. }));
    }

    #[test]
    fn clear_then_set_new_target() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0xffff_ffff_7000_0000);
        let p1 = PhysicalAddress::new(0xfec0_0000);
        let p2 = PhysicalAddress::new(0xfee0_0000);
        aspace
            .set_page(&mut alloc, va, p1, PageAttributes::DEVICE)
            .unwrap();
        aspace.clear_page(va, false).unwrap();
        assert!(aspace.query(va).is_none());

        let before = alloc.allocated();
        aspace
            .set_page(&mut alloc, va, p2, PageAttributes::DEVICE)
            .unwrap();
        assert_eq!(aspace.query(va).unwrap().phys, p2);
        // Tables survive the clear and are reused.
        assert_eq!(alloc.allocated(), before);
    }

    #[test]
    fn clear_large_page() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0);
        aspace
            .set_page(&mut alloc, va, PhysicalAddress::new(0), PageAttributes::KERNEL_LARGE)
            .unwrap();

        // A 4 KiB clear does not tear down a 2 MiB leaf.
        assert_eq!(aspace.clear_page(va, false), Err(MapError::NotMapped(va)));
        aspace.clear_page(va, true).unwrap();
        assert!(aspace.query(va).is_none());
    }

    #[test]
    fn clear_unmapped_fails() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let va = VirtualAddress::new(0xffff_8000_0000_0000);
        assert_eq!(aspace.clear_page(va, false), Err(MapError::NotMapped(va)));
        assert_eq!(aspace.clear_page(va, true), Err(MapError::NotMapped(va)));

        // Tables exist, but the leaf does not.
        aspace
            .set_page(&mut alloc, va, PhysicalAddress::new(0x1000), PageAttributes::WRITABLE)
            .unwrap();
        let neighbor = va + 0x1000;
        assert_eq!(
            aspace.clear_page(neighbor, false),
            Err(MapError::NotMapped(neighbor))
        );
    }

    #[test]
    fn out_of_memory_is_reported() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::with_limit(2);
        let mut aspace = space(&arena, &mut alloc);

        let err = aspace
            .set_page(
                &mut alloc,
                VirtualAddress::new(0x4000_0000),
                PhysicalAddress::new(0x1000),
                PageAttributes::WRITABLE,
            )
            .unwrap_err();
        assert_eq!(err, MapError::OutOfMemory);
    }

    #[test]
    fn user_mapping_upgrades_intermediate_links() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let kernel = VirtualAddress::new(0x0000_0000_4000_0000);
        let user = kernel + 0x1000;
        aspace
            .set_page(&mut alloc, kernel, PhysicalAddress::new(0x1000), PageAttributes::WRITABLE)
            .unwrap();
        aspace
            .set_page(
                &mut alloc,
                user,
                PhysicalAddress::new(0x2000),
                PageAttributes::WRITABLE | PageAttributes::USER,
            )
            .unwrap();

        let root = arena.table(aspace.root_page());
        assert!(root.get(Level::L4.index(user)).user());
        assert_eq!(
            aspace.query(kernel).unwrap().attributes,
            PageAttributes::WRITABLE
        );
    }

    #[test]
    fn direct_map_shares_l3_between_aliases() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let mut aspace = space(&arena, &mut alloc);

        let aliases = [VirtualAddress::new(STRAIGHT), VirtualAddress::new(0)];
        let count = aspace
            .link_direct_map(
                &mut alloc,
                PhysicalAddress::new(0),
                PhysicalAddress::new(Size1G::SIZE + Size2M::SIZE),
                &aliases,
            )
            .unwrap();
        assert_eq!(count, 513);

        let root = arena.table(aspace.root_page());
        let straight = root.get(Level::L4.index(aliases[0]));
        let identity = root.get(Level::L4.index(aliases[1]));
        assert_eq!(straight.phys(), identity.phys());

        // root + one shared L3 + two L2 tables
        assert_eq!(alloc.allocated(), 4);

        for pa in [0, 0x20_0000, Size1G::SIZE] {
            let s = aspace.query(VirtualAddress::new(STRAIGHT + pa)).unwrap();
            let i = aspace.query(VirtualAddress::new(pa)).unwrap();
            assert_eq!(s.phys.as_u64(), pa);
            assert_eq!(s, i);
            assert_eq!(s.attributes, PageAttributes::KERNEL_LARGE);
        }
        assert!(aspace.query(VirtualAddress::new(Size1G::SIZE + Size2M::SIZE)).is_none());
    }

    #[test]
    fn activate_loads_root() {
        let arena = FrameArena::default();
        let mut alloc = ScratchAlloc::default();
        let aspace = space(&arena, &mut alloc);

        let mut reg = RecordingRoot::default();
        unsafe { aspace.activate(&mut reg) };
        assert_eq!(reg.loads, [aspace.root_page()]);
    }
}
