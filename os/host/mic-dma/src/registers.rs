//! # DMA register block
//!
//! Each hardware channel owns a 0x40-byte slice of the device's system-box
//! register space, starting at [`DMA_REGISTER_BASE`]. Offsets below are
//! relative to channel 0; [`ChannelRegisters`] adds the channel stride.

use bitfield_struct::bitfield;
use core::fmt;
use core::ptr::{read_volatile, write_volatile};

/// Start of channel 0's registers in the system box.
pub const DMA_REGISTER_BASE: usize = 0xA000;

/// Distance between two channels' register slices.
pub const CHANNEL_STRIDE: usize = 0x40;

/// Head pointer. Writing it hands descriptors to the engine (doorbell).
pub const DHPR: usize = 0x04;

/// Tail pointer. Advanced by the engine as descriptors complete.
pub const DTPR: usize = 0x08;

/// Ring base address, low 32 bits.
pub const DRAR_LO: usize = 0x14;

/// Ring base address high bits, ring size and placement. See [`DrarHi`].
pub const DRAR_HI: usize = 0x18;

/// 32-bit register access at a byte offset into the system box.
pub trait RegisterBlock {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

impl<T: RegisterBlock + ?Sized> RegisterBlock for &T {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value);
    }
}

/// A memory-mapped register window.
#[derive(Clone, Copy)]
pub struct MmioRegion {
    base: usize,
    size: usize,
}

impl MmioRegion {
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `base` points to a valid, mapped MMIO region of at least `size` bytes
    /// - The region has device memory attributes (non-cacheable)
    #[inline]
    #[must_use]
    pub const unsafe fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl RegisterBlock for MmioRegion {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.size, "MMIO read32 offset out of bounds");
        debug_assert!(offset.is_multiple_of(4), "MMIO read32 offset not aligned");
        // SAFETY: Caller ensured base is valid MMIO, offset is within bounds
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.size, "MMIO write32 offset out of bounds");
        debug_assert!(offset.is_multiple_of(4), "MMIO write32 offset not aligned");
        // SAFETY: Caller ensured base is valid MMIO, offset is within bounds
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}

/// One channel's view of the register block.
pub struct ChannelRegisters<'a, B: RegisterBlock> {
    regs: &'a B,
    channel: usize,
}

impl<'a, B: RegisterBlock> ChannelRegisters<'a, B> {
    #[inline]
    pub const fn new(regs: &'a B, channel: usize) -> Self {
        Self { regs, channel }
    }

    #[inline]
    const fn offset(&self, register: usize) -> usize {
        DMA_REGISTER_BASE + register + CHANNEL_STRIDE * self.channel
    }

    #[inline]
    pub fn read(&self, register: usize) -> u32 {
        self.regs.read32(self.offset(register))
    }

    #[inline]
    pub fn write(&self, register: usize, value: u32) {
        self.regs.write32(self.offset(register), value);
    }

    /// Read the registers that describe the ring, for diagnostics.
    pub fn snapshot(&self) -> ChannelRegisterSnapshot {
        ChannelRegisterSnapshot {
            channel: self.channel,
            drar_hi: DrarHi::from_bits(self.read(DRAR_HI)),
            drar_lo: self.read(DRAR_LO),
            dtpr: self.read(DTPR),
            dhpr: self.read(DHPR),
        }
    }
}

/// `DRAR_HI`: where the ring lives and how many descriptors it holds.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct DrarHi {
    /// Ring base address bits 35..32.
    #[bits(4)]
    pub base_high: u8,

    /// Number of descriptors in the ring.
    #[bits(17)]
    pub size: u32,

    /// Ring base address bits 38..34 (page select).
    #[bits(5)]
    pub page: u8,

    /// The ring lives in system (host) memory.
    pub system: bool,

    #[bits(5)]
    __: u8,
}

impl DrarHi {
    /// `DRAR_HI` for a ring of `count` descriptors at device address `base`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn for_ring(base: u64, count: u32) -> Self {
        Self::new()
            .with_size(count)
            .with_base_high(((base >> 32) & 0xF) as u8)
            .with_page(((base >> 34) & 0x1F) as u8)
            .with_system(true)
    }
}

/// Register values of one channel at a point in time.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChannelRegisterSnapshot {
    pub channel: usize,
    pub drar_hi: DrarHi,
    pub drar_lo: u32,
    pub dtpr: u32,
    pub dhpr: u32,
}

impl fmt::Display for ChannelRegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel {}: DRAR-HI {:#x}, LO {:#x}, DTPR {:#x}, DHPR {:#x}",
            self.channel,
            self.drar_hi.into_bits(),
            self.drar_lo,
            self.dtpr,
            self.dhpr
        )
    }
}
