//! # Kernel Memory Allocation and Address Space
//!
//! Everything the coprocessor kernel needs to go from "loaded somewhere in
//! physical memory" to "running on its own page tables with a real
//! allocator":
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                KernelSpace                          │
//! │    • initial tables (direct map, text, low area)    │
//! │    • fixed window for device registers              │
//! │    • reserved-range report                          │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ FrameAlloc / PhysMapper
//! ┌─────────────────▼───────────────────────────────────┐
//! │                PageAllocator                        │
//! │    • Bootstrap: BumpAllocator after the image       │
//! │    • Delegated: &'static dyn PageAllocatorOps       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Boot sequence
//!
//! 1. Create a [`BumpAllocator`] at the end of the kernel image.
//! 2. [`KernelSpace::build`] the page tables from it; the root is loaded.
//! 3. The general-purpose allocator asks for
//!    [`reserve_arch_pages`](KernelSpace::reserve_arch_pages) and then
//!    installs itself with [`PageAllocator::set_page_allocator`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod bootstrap;
mod kernel_space;
mod page_alloc;
pub mod phys_mapper;
mod reservations;

pub use bootstrap::BumpAllocator;
pub use kernel_space::{KernelSpace, KernelSpaceError, SharedKernelSpace};
pub use page_alloc::{AllocFlags, ByteAllocator, PageAllocator, PageAllocatorOps};
pub use reservations::{MicroArchReservations, NoMicroArchReservations, ReservationSink};
