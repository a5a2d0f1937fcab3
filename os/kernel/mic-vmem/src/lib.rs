//! # Virtual Memory Support
//!
//! x86-64 4-level paging for the coprocessor kernel.
//!
//! ## What you get
//! - A unified [`PageEntry`] bitfield, decoded per [`Level`] into an [`EntryKind`].
//! - A 4 KiB-aligned [`PageTable`] and index helpers ([`split_indices`]).
//! - [`PageAttributes`] describing what a mapping should allow.
//! - An [`AddressSpace`] that sets, clears and queries mappings, and builds
//!   direct maps shared between several virtual aliases.
//! - The seams it needs from the outside world: [`FrameAlloc`],
//!   [`PhysMapper`] and [`RootRegister`].
//!
//! ## Virtual Address → Physical Address Walk
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L4   |  L3   |  L2   |  L1   | Offset |
//! ```
//!
//! Each field indexes a table of 512 eight-byte entries. The walk may end
//! early at L2 with a 2 MiB leaf (`PS=1`), which is the only large page size
//! the kernel creates.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "test-util"))]
extern crate alloc;

mod address_space;
mod attributes;
mod entry;
mod error;
mod root;
mod table;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use crate::address_space::{AddressSpace, Mapping};
pub use crate::attributes::PageAttributes;
pub use crate::entry::{EntryKind, LeafSize, PageEntry};
pub use crate::error::MapError;
#[cfg(feature = "asm")]
pub use crate::root::Cr3Register;
pub use crate::root::RootRegister;
pub use crate::table::{ENTRIES, Level, PageTable, TableIndex, split_indices};

use mic_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Source of **physical** 4 KiB frames for page tables.
///
/// Returns `None` on out-of-memory. Frames need not be zeroed.
pub trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

/// Converts physical addresses to usable references in the current address
/// space (straight map in the kernel, an arena in tests).
pub trait PhysMapper {
    /// # Safety
    /// - `pa` must be mapped writable for the lifetime `'a`.
    /// - `T` must match the bytes at `pa` and must not alias another live reference.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// Borrow the page table stored in `page`.
    ///
    /// # Safety
    /// See [`phys_to_mut`](Self::phys_to_mut).
    #[inline]
    unsafe fn table_mut<'a>(&self, page: PhysicalPage<Size4K>) -> &'a mut PageTable {
        unsafe { self.phys_to_mut::<PageTable>(page.base()) }
    }
}
