//! # Page Tables and Indices

use crate::PageEntry;
use mic_addresses::VirtualAddress;

/// Number of entries in one table at any level.
pub const ENTRIES: usize = 512;

/// Paging level, counted from the leaf (`L1`) up to the root (`L4`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    L1 = 1,
    L2 = 2,
    L3 = 3,
    L4 = 4,
}

impl Level {
    /// Bit position of this level's index within a virtual address.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::L4 => 39,
            Self::L3 => 30,
            Self::L2 => 21,
            Self::L1 => 12,
        }
    }

    /// Index into a table at this level for `va` (9 bits).
    #[inline]
    #[must_use]
    pub const fn index(self, va: VirtualAddress) -> TableIndex {
        TableIndex::new(((va.as_u64() >> self.shift()) & 0x1FF) as u16)
    }
}

/// Index into a 512-entry table.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 512);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Split `va` into its L4, L3, L2 and L1 indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (TableIndex, TableIndex, TableIndex, TableIndex) {
    (
        Level::L4.index(va),
        Level::L3.index(va),
        Level::L2.index(va),
        Level::L1.index(va),
    )
}

/// A 4 KiB-aligned array of 512 entries, valid at any level.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; ENTRIES],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [PageEntry::zero(); ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Mark every entry non-present.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntry::zero());
    }

    #[cfg(test)]
    pub(crate) fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.present()).count()
    }
}
