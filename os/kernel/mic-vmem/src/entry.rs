//! # Page Table Entries
//!
//! All four levels share one 64-bit layout. What an entry *means* depends
//! on the level it sits at:
//!
//! | Level | `PS=0`            | `PS=1`                  |
//! |:------|:------------------|:------------------------|
//! | L4    | next table (L3)   | reserved, never set     |
//! | L3    | next table (L2)   | 1 GiB leaf (never made) |
//! | L2    | next table (L1)   | 2 MiB leaf              |
//! | L1    | 4 KiB leaf        | bit 7 is PAT, not PS    |
//!
//! Use [`PageEntry::kind`] to decode an entry for a given [`Level`].

use crate::PageAttributes;
use crate::table::Level;
use bitfield_struct::bitfield;
use mic_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size1G, Size2M, Size4K};

/// One x86-64 paging-structure entry.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntry {
    /// **Present** (bit 0): valid entry if set.
    pub present: bool,

    /// **Writable** (bit 1): write permission. Intersects across the walk.
    pub writable: bool,

    /// **User/Supervisor** (bit 2): allow ring-3 access if set.
    pub user: bool,

    /// **Page Write-Through** (PWT, bit 3).
    pub write_through: bool,

    /// **Page Cache Disable** (PCD, bit 4).
    pub cache_disable: bool,

    /// **Accessed** (bit 5): set by the CPU on first access.
    pub accessed: bool,

    /// **Dirty** (bit 6): set by the CPU on first write to a leaf.
    pub dirty: bool,

    /// **Page Size** (bit 7): large leaf at L2/L3. PAT at L1.
    pub large_page: bool,

    /// **Global** (bit 8): leaves only.
    pub global: bool,

    /// OS-available low (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,

    /// Physical address bits 51..12. A 2 MiB leaf keeps bits 20..12 zero.
    #[bits(40)]
    phys_addr_51_12: u64,

    /// OS-available high (bits 52..58).
    #[bits(7)]
    pub os_available_high: u8,

    /// Protection Key / OS use (59..62).
    #[bits(4)]
    pub protection_key: u8,

    /// **No-Execute** (bit 63).
    pub no_execute: bool,
}

/// Size of the region a leaf entry maps.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LeafSize {
    Size4K,
    Size2M,
    Size1G,
}

impl LeafSize {
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Size4K => Size4K::SIZE,
            Self::Size2M => Size2M::SIZE,
            Self::Size1G => Size1G::SIZE,
        }
    }
}

/// Decoded view of a [`PageEntry`] at a known [`Level`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// Not present.
    Absent,
    /// Points to the next lower table.
    NextTable(PhysicalPage<Size4K>),
    /// Maps memory directly.
    Leaf { base: PhysicalAddress, size: LeafSize },
}

impl PageEntry {
    /// An all-zero, non-present entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new()
    }

    /// Link to the next lower table. Intermediate links are always writable;
    /// the leaf decides the effective permission.
    #[inline]
    #[must_use]
    pub const fn make_next(next: PhysicalPage<Size4K>, user: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(user)
            .with_phys_addr_51_12(next.base().as_u64() >> 12)
    }

    /// A 2 MiB leaf for an L2 slot.
    #[inline]
    #[must_use]
    pub const fn make_2m(page: PhysicalPage<Size2M>, attrs: PageAttributes) -> Self {
        Self::leaf_bits(page.base(), attrs).with_large_page(true)
    }

    /// A 4 KiB leaf for an L1 slot.
    #[inline]
    #[must_use]
    pub const fn make_4k(page: PhysicalPage<Size4K>, attrs: PageAttributes) -> Self {
        Self::leaf_bits(page.base(), attrs)
    }

    const fn leaf_bits(base: PhysicalAddress, attrs: PageAttributes) -> Self {
        let uncached = attrs.contains(PageAttributes::UNCACHEABLE);
        Self::new()
            .with_present(true)
            .with_writable(attrs.contains(PageAttributes::WRITABLE))
            .with_user(attrs.contains(PageAttributes::USER))
            .with_cache_disable(uncached)
            .with_write_through(uncached)
            .with_phys_addr_51_12(base.as_u64() >> 12)
    }

    /// Raw physical address field (low 12 bits zero).
    #[inline]
    #[must_use]
    pub const fn phys(self) -> PhysicalAddress {
        PhysicalAddress::new(self.phys_addr_51_12() << 12)
    }

    /// Interpret this entry as found at `level`.
    #[must_use]
    pub const fn kind(self, level: Level) -> EntryKind {
        if !self.present() {
            return EntryKind::Absent;
        }
        let base = self.phys();
        match level {
            Level::L3 if self.large_page() => EntryKind::Leaf {
                base,
                size: LeafSize::Size1G,
            },
            Level::L2 if self.large_page() => EntryKind::Leaf {
                base,
                size: LeafSize::Size2M,
            },
            Level::L4 | Level::L3 | Level::L2 => EntryKind::NextTable(base.page()),
            Level::L1 => EntryKind::Leaf {
                base,
                size: LeafSize::Size4K,
            },
        }
    }

    /// The software attributes of a leaf entry at `level`.
    #[must_use]
    pub const fn attributes(self, level: Level) -> PageAttributes {
        let mut attrs = PageAttributes::empty();
        if self.writable() {
            attrs = attrs.union(PageAttributes::WRITABLE);
        }
        if self.user() {
            attrs = attrs.union(PageAttributes::USER);
        }
        if self.cache_disable() {
            attrs = attrs.union(PageAttributes::UNCACHEABLE);
        }
        if self.large_page() && !matches!(level, Level::L1) {
            attrs = attrs.union(PageAttributes::LARGE);
        }
        attrs
    }
}
