use crate::PhysicalAddress;
use core::fmt;

/// An address as the DMA engine on the coprocessor sees it.
///
/// Host memory appears to the device at a fixed system offset; local device
/// memory is used as-is. Only the translator in `mic-layout` should produce
/// these from host addresses.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DevicePhysicalAddress(u64);

impl DevicePhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// A device-local physical address needs no translation.
    #[inline]
    #[must_use]
    pub const fn from_local(pa: PhysicalAddress) -> Self {
        Self(pa.as_u64())
    }
}

impl fmt::Debug for DevicePhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPA(0x{:016X})", self.0)
    }
}

impl fmt::Display for DevicePhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<DevicePhysicalAddress> for u64 {
    #[inline]
    fn from(a: DevicePhysicalAddress) -> Self {
        a.as_u64()
    }
}
