//! # Memory Layout and Address Translation
//!
//! The single source of truth for where things live in the coprocessor
//! kernel's address space, and the arithmetic that moves between the
//! address spaces involved.
//!
//! ## Virtual Memory Layout
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │  Null guard (2 MiB, 0 → 0)      │
//!                       │  Identity alias of direct map   │
//!                       │  (shares L3 with straight map)  │
//! STRAIGHT_MAP_BASE     ├─────────────────────────────────┤ 0xffff_8000_0000_0000
//!                       │  Straight map: VA = PA + base   │
//!                       │                                 │
//! FIXED_WINDOW_BASE     ├─────────────────────────────────┤ 0xffff_ffff_7000_0000
//!                       │  Fixed window (append-only,     │
//!                       │  MMIO and other ad-hoc maps)    │
//! KERNEL_VIRT_BASE      ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │  Kernel text & data, backed by  │
//!                       │  the relocatable physical base  │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Translators
//!
//! * [`AddressTranslator`] converts kernel virtual addresses to physical
//!   addresses and back, honoring the physical base the image was loaded at.
//! * [`DeviceAddressTranslator`] converts host physical addresses into the
//!   form the DMA engine expects, rejecting anything outside the host aperture.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod boot;
pub mod memory;
mod translator;

pub use boot::BootParameters;
pub use translator::{AddressTranslator, DeviceAddressTranslator, TranslateError};
