//! # Host DMA Driver
//!
//! Drives the coprocessor's DMA engine from the host. Each host channel owns
//! a one-page ring of 16-byte descriptors in host memory; the host writes
//! descriptors at the head and rings the doorbell, the engine consumes them
//! and advances the tail.
//!
//! ```text
//!            host writes                     engine consumes
//!                 │                                 │
//!   ┌─────┬─────┬─▼───┬─────┬─────┬─────┬─────┬─────▼─────┐
//!   │ ... │ new │ head│free │free │free │tail │ in flight │
//!   └─────┴─────┴─────┴─────┴─────┴─────┴─────┴───────────┘
//! ```
//!
//! Host addresses in a [`DmaRequest`] are translated into the device's view
//! of system memory before any slot is claimed; addresses that already are
//! device addresses pass through untouched.
//!
//! ## Example
//!
//! ```no_run
//! use mic_addresses::{PhysicalAddress, VirtualAddress};
//! use mic_dma::{DmaAddress, DmaDevice, DmaRequest, HostMemory, MmioRegion};
//!
//! struct Linear;
//!
//! impl HostMemory for Linear {
//!     fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
//!         PhysicalAddress::new(va.as_u64())
//!     }
//! }
//!
//! # fn sbox_base() -> usize { 0 }
//! let regs = unsafe { MmioRegion::new(sbox_base(), 0x1_0000) };
//! let dev = DmaDevice::new(regs, Linear);
//! dev.init().unwrap();
//!
//! let req = DmaRequest::new(
//!     DmaAddress::Host(PhysicalAddress::new(0x10_0000)),
//!     DmaAddress::Host(PhysicalAddress::new(0x20_0000)),
//!     100_000,
//! )
//! .with_interrupt();
//! dev.channel(0).unwrap().submit(&req).unwrap();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod channel;
pub mod descriptor;
mod device;
mod error;
mod host;
pub mod registers;
mod request;
mod ring;
#[cfg(test)]
mod testing;

pub use channel::DmaChannel;
pub use descriptor::{Descriptor, RawDescriptor};
pub use device::{CHANNEL_COUNT, DmaChannelHandle, DmaDevice, HOST_CHANNEL_BASE, HOST_CHANNELS};
pub use error::DmaError;
pub use host::HostMemory;
pub use registers::{ChannelRegisterSnapshot, MmioRegion, RegisterBlock};
pub use request::{Completion, DmaAddress, DmaRequest};
pub use ring::{DescriptorRing, RING_BYTES, RING_CAPACITY};
