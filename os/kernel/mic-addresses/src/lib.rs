//! # Typed Addresses
//!
//! Strongly typed wrappers for the three address spaces the kernel and the
//! host DMA driver juggle:
//!
//! - [`VirtualAddress`]: kernel virtual addresses (straight map, text, fixed window).
//! - [`PhysicalAddress`]: physical addresses, page-table frames and buffers.
//! - [`DevicePhysicalAddress`]: addresses as the DMA engine sees them.
//!
//! Pages are parameterized by a [`PageSize`] marker so that 4 KiB frames and
//! 2 MiB large pages cannot be mixed up:
//!
//! ```
//! # use mic_addresses::*;
//! let va = VirtualAddress::new(0xffff_8000_0020_1234);
//! let (page, off) = va.split::<Size2M>();
//! assert_eq!(page.base().as_u64(), 0xffff_8000_0020_0000);
//! assert_eq!(off.as_u64(), 0x1234);
//! assert_eq!(page.join(off), va);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod device_address;
mod memory_address;
mod page_size;
mod physical_address;
mod virtual_address;

pub use device_address::DevicePhysicalAddress;
pub use memory_address::{MemoryAddress, MemoryAddressOffset, MemoryPage};
pub use page_size::{PageSize, Size1G, Size2M, Size4K, Size512G};
pub use physical_address::{PhysicalAddress, PhysicalPage};
pub use virtual_address::{VirtualAddress, VirtualPage};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_sizes() {
        assert_eq!(Size4K::SIZE, 4096);
        assert_eq!(Size2M::SIZE, 2 * 1024 * 1024);
        assert_eq!(Size1G::SIZE, 1024 * 1024 * 1024);
        assert_eq!(Size512G::SIZE, 512 * Size1G::SIZE);
        assert_eq!(Size512G::as_str(), "512G");
    }

    #[test]
    fn split_and_join_4k() {
        let va = VirtualAddress::new(0xffff_ffff_8000_1abc);
        let (page, off) = va.split::<Size4K>();
        assert_eq!(page.base().as_u64(), 0xffff_ffff_8000_1000);
        assert_eq!(off.as_u64(), 0xabc);
        assert_eq!(page.join(off), va);
    }

    #[test]
    fn align_up_and_down() {
        let pa = PhysicalAddress::new(0x20_0001);
        assert_eq!(pa.align_down::<Size2M>().as_u64(), 0x20_0000);
        assert_eq!(pa.align_up::<Size2M>().as_u64(), 0x40_0000);
        assert_eq!(
            PhysicalAddress::new(0x40_0000).align_up::<Size2M>().as_u64(),
            0x40_0000
        );
        assert!(PhysicalAddress::new(0x1000).is_aligned::<Size4K>());
        assert!(!PhysicalAddress::new(0x1000).is_aligned::<Size2M>());
    }

    #[test]
    fn forward_pages() {
        let p = PhysicalAddress::new(0x20_0000).page::<Size2M>();
        assert_eq!(p.forward(3).base().as_u64(), 0x80_0000);
        let v = VirtualAddress::new(0xffff_ffff_7000_0000).page::<Size4K>();
        assert_eq!(v.forward(2).base().as_u64(), 0xffff_ffff_7000_2000);
    }

    #[test]
    fn checked_add_overflows() {
        assert!(VirtualAddress::new(u64::MAX).checked_add(1).is_none());
        assert_eq!(
            PhysicalAddress::new(0x1000).checked_add(0x10),
            Some(PhysicalAddress::new(0x1010))
        );
    }

    #[test]
    fn canonical_addresses() {
        assert!(VirtualAddress::new(0xffff_8000_0000_0000).is_canonical());
        assert!(VirtualAddress::new(0x0000_7fff_ffff_ffff).is_canonical());
        assert!(!VirtualAddress::new(0x0000_8000_0000_0000).is_canonical());
    }

    #[test]
    fn debug_formats() {
        assert_eq!(
            format!("{:?}", PhysicalAddress::new(0x1000)),
            "PA(0x0000000000001000)"
        );
        assert_eq!(
            format!("{:?}", DevicePhysicalAddress::new(0x80_0000_1000)),
            "DPA(0x0000008000001000)"
        );
        assert_eq!(
            format!("{}", VirtualAddress::new(0x10).page::<Size4K>()),
            "0x0000000000000000/4K"
        );
    }
}
