#[cfg(feature = "asm")]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use mic_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3: Page-Map Level-4 Base Register (IA-32e, PCID disabled).
///
/// Holds the physical base address of the L4 table and cache-control flags
/// for L4 walks.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Cr3 {
    /// Bits 0–2: Reserved (must be 0).
    #[bits(3)]
    __: u8,

    /// Bit 3: PWT: Page-level Write-Through for the L4 table.
    pub pwt: bool,

    /// Bit 4: PCD: Page-level Cache Disable for the L4 table.
    pub pcd: bool,

    /// Bits 5–11: Reserved (must be 0 when written).
    #[bits(7)]
    __: u8,

    /// Bits 12–51: L4 physical base >> 12.
    #[bits(40)]
    root_base_4k: u64,

    /// Bits 52–63: Reserved.
    #[bits(12)]
    __: u16,
}

impl Cr3 {
    /// A write-back `Cr3` value pointing at `root`.
    #[must_use]
    pub const fn from_root(root: PhysicalPage<Size4K>) -> Self {
        Self::new().with_root_base_4k(root.base().as_u64() >> 12)
    }

    /// Physical base of the L4 table.
    #[must_use]
    pub const fn root_phys(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.root_base_4k() << 12)
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let mut cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}
